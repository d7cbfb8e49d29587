//! Request and response shapes of the Cambio backend.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::session::ProfileHint;

/// Foreign currencies quoted against the Kwanza.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Usd,
    Eur,
    Zar,
    Cad,
}

impl Currency {
    pub const ALL: [Currency; 4] = [Currency::Usd, Currency::Eur, Currency::Zar, Currency::Cad];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "usd",
            Currency::Eur => "eur",
            Currency::Zar => "zar",
            Currency::Cad => "cad",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usd" => Ok(Currency::Usd),
            "eur" => Ok(Currency::Eur),
            "zar" => Ok(Currency::Zar),
            "cad" => Ok(Currency::Cad),
            other => Err(format!("unsupported currency '{}', expected usd, eur, zar or cad", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateType {
    Buy,
    Sell,
}

impl RateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateType::Buy => "buy",
            RateType::Sell => "sell",
        }
    }
}

impl fmt::Display for RateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(RateType::Buy),
            "sell" => Ok(RateType::Sell),
            other => Err(format!("unsupported rate type '{}', expected buy or sell", other)),
        }
    }
}

/// Whether an alert fires when the rate rises above or falls below the value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    #[default]
    Above,
    Below,
}

impl FromStr for AlertDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "above" => Ok(AlertDirection::Above),
            "below" => Ok(AlertDirection::Below),
            other => Err(format!("unsupported alert type '{}', expected above or below", other)),
        }
    }
}

/// Alert as typed by a user, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertRequest {
    pub currency: String,
    pub value: f64,
    pub rate_type: String,
    /// Defaults to "above".
    pub direction: Option<String>,
}

/// Validated alert body sent to `POST /alerts`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub currency: Currency,
    pub value: f64,
    #[serde(rename = "type")]
    pub direction: AlertDirection,
    pub rate_type: RateType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(alias = "_id")]
    pub id: String,
    pub currency: Currency,
    pub value: f64,
    #[serde(rename = "type", default)]
    pub direction: AlertDirection,
    pub rate_type: RateType,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// The eight quotes that make up one day's board, in Kwanza.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateBoard {
    pub usd_buy: f64,
    pub usd_sell: f64,
    pub eur_buy: f64,
    pub eur_sell: f64,
    pub zar_buy: f64,
    pub zar_sell: f64,
    pub cad_buy: f64,
    pub cad_sell: f64,
}

impl RateBoard {
    /// Field name and value pairs, in wire order.
    pub fn fields(&self) -> [(&'static str, f64); 8] {
        [
            ("usdBuy", self.usd_buy),
            ("usdSell", self.usd_sell),
            ("eurBuy", self.eur_buy),
            ("eurSell", self.eur_sell),
            ("zarBuy", self.zar_buy),
            ("zarSell", self.zar_sell),
            ("cadBuy", self.cad_buy),
            ("cadSell", self.cad_sell),
        ]
    }

    pub fn quote(&self, currency: Currency, rate_type: RateType) -> f64 {
        match (currency, rate_type) {
            (Currency::Usd, RateType::Buy) => self.usd_buy,
            (Currency::Usd, RateType::Sell) => self.usd_sell,
            (Currency::Eur, RateType::Buy) => self.eur_buy,
            (Currency::Eur, RateType::Sell) => self.eur_sell,
            (Currency::Zar, RateType::Buy) => self.zar_buy,
            (Currency::Zar, RateType::Sell) => self.zar_sell,
            (Currency::Cad, RateType::Buy) => self.cad_buy,
            (Currency::Cad, RateType::Sell) => self.cad_sell,
        }
    }
}

/// One published day of rates; the backend returns newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRate {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(flatten)]
    pub board: RateBoard,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    #[serde(alias = "_id")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub alerts_count: Option<u32>,
    #[serde(default, alias = "dateCreated")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_login: Option<String>,
    #[serde(default)]
    pub login_count: Option<u32>,
    #[serde(default)]
    pub premium_expiry_date: Option<String>,
}

/// Response of the login, register, Google and validate endpoints.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<ProfileHint>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Outcome of an authentication call.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthOutcome {
    pub response: AuthResponse,
    /// True if the returned token was accepted and is now the session.
    pub session_started: bool,
}

/// Acknowledgement bodies: `{"message": ...}` plus whatever else the
/// backend chose to include.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServerMessage {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// Google Identity credential as handed over by the sign-in widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCredential {
    pub credential: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Conversion request for `POST /simulate`. Codes include `aoa`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    pub amount: f64,
    pub from_currency: String,
    pub to_currency: String,
}

/// The xlsx workbook returned by `POST /export-rates`.
#[derive(Debug, Clone, PartialEq)]
pub struct RatesExport {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Lists come back either bare or wrapped in an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Listing<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "rates", alias = "alerts", alias = "users")]
        items: Vec<T>,
    },
}

impl<T> Listing<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(items) | Listing::Wrapped { items } => items,
        }
    }
}
