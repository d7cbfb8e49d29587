//! Input checks run before any request leaves the process.

use std::sync::OnceLock;
use regex::Regex;

use crate::api::types::{
    AlertDirection, AlertRequest, Currency, NewAlert, RateBoard, RateType, Simulation,
};
use crate::error::{ApiError, ApiResult};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Currency codes the simulator accepts, Kwanza included.
pub const SIMULATION_CURRENCIES: [&str; 5] = ["aoa", "usd", "eur", "zar", "cad"];

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();
static OBJECT_ID_REGEX: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Email regex is valid"))
}

/// Angolan mobile numbers: +244, optional space, then 9 and eight digits.
fn phone_regex() -> &'static Regex {
    PHONE_REGEX.get_or_init(|| Regex::new(r"^\+244\s?9\d{8}$").expect("Phone regex is valid"))
}

fn object_id_regex() -> &'static Regex {
    OBJECT_ID_REGEX.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("Object id regex is valid"))
}

pub fn email(value: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::validation("email", "email is required"));
    }
    if !email_regex().is_match(value) {
        return Err(ApiError::validation("email", "invalid email address"));
    }
    Ok(value.to_string())
}

pub fn password(value: &str) -> ApiResult<()> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(
            "password",
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

pub fn required(field: &'static str, value: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::validation(field, format!("{} is required", field)));
    }
    Ok(value.to_string())
}

pub fn phone_number(value: &str) -> ApiResult<String> {
    let value = value.trim();
    if !phone_regex().is_match(value) {
        return Err(ApiError::validation(
            "phoneNumber",
            "invalid Angolan phone number, expected +244 9XXXXXXXX",
        ));
    }
    Ok(value.to_string())
}

/// Backend user ids are 24-character hex object ids.
pub fn user_id(value: &str) -> ApiResult<String> {
    let value = value.trim();
    if !object_id_regex().is_match(value) {
        return Err(ApiError::validation("userId", "user id must be a 24-character hex id"));
    }
    Ok(value.to_string())
}

pub fn alert(request: &AlertRequest) -> ApiResult<NewAlert> {
    let currency = request
        .currency
        .parse::<Currency>()
        .map_err(|e| ApiError::validation("currency", e))?;
    let rate_type = request
        .rate_type
        .parse::<RateType>()
        .map_err(|e| ApiError::validation("rateType", e))?;
    let direction = match request.direction.as_deref() {
        Some(d) if !d.trim().is_empty() => d.parse::<AlertDirection>().map_err(|e| ApiError::validation("type", e))?,
        _ => AlertDirection::default(),
    };
    if !(request.value.is_finite() && request.value > 0.0) {
        return Err(ApiError::validation("value", "value must be greater than zero"));
    }
    Ok(NewAlert {
        currency,
        value: request.value,
        direction,
        rate_type,
    })
}

pub fn rate_board(board: &RateBoard) -> ApiResult<()> {
    for (field, value) in board.fields() {
        if !(value.is_finite() && value > 0.0) {
            return Err(ApiError::validation(field, format!("{} must be a positive number", field)));
        }
    }
    Ok(())
}

pub fn simulation(request: &Simulation) -> ApiResult<Simulation> {
    if !(request.amount.is_finite() && request.amount > 0.0) {
        return Err(ApiError::validation("amount", "amount must be greater than zero"));
    }
    let from = simulation_currency("fromCurrency", &request.from_currency)?;
    let to = simulation_currency("toCurrency", &request.to_currency)?;
    if from == to {
        return Err(ApiError::validation("toCurrency", "source and target currency must differ"));
    }
    Ok(Simulation {
        amount: request.amount,
        from_currency: from,
        to_currency: to,
    })
}

fn simulation_currency(field: &'static str, value: &str) -> ApiResult<String> {
    let code = value.trim().to_ascii_lowercase();
    if SIMULATION_CURRENCIES.contains(&code.as_str()) {
        Ok(code)
    } else {
        Err(ApiError::validation(field, format!("unsupported currency '{}'", value.trim())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: ApiError) -> &'static str {
        match err {
            ApiError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_email_and_password() {
        assert_eq!(email("  ana@example.ao ").unwrap(), "ana@example.ao");
        assert_eq!(field_of(email("ana@example").unwrap_err()), "email");
        assert_eq!(field_of(email("").unwrap_err()), "email");
        assert!(password("12345678").is_ok());
        assert_eq!(field_of(password("1234567").unwrap_err()), "password");
    }

    #[test]
    fn test_phone_numbers() {
        assert!(phone_number("+244 923456789").is_ok());
        assert!(phone_number("+244923456789").is_ok());
        assert!(phone_number("+244 823456789").is_err());
        assert!(phone_number("923456789").is_err());
    }

    #[test]
    fn test_user_id() {
        assert!(user_id("64b7f0c2a1b2c3d4e5f60718").is_ok());
        assert!(user_id("64b7f0c2a1b2c3d4e5f6071").is_err());
        assert!(user_id("zzzzzzzzzzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn test_alert_rules() {
        let ok = AlertRequest {
            currency: "USD".into(),
            value: 900.0,
            rate_type: "sell".into(),
            direction: None,
        };
        let alert = alert(&ok).unwrap();
        assert_eq!(alert.currency, Currency::Usd);
        assert_eq!(alert.rate_type, RateType::Sell);
        assert_eq!(alert.direction, AlertDirection::Above);

        let bad_currency = AlertRequest { currency: "gbp".into(), ..ok.clone() };
        assert_eq!(field_of(super::alert(&bad_currency).unwrap_err()), "currency");
        let bad_type = AlertRequest { rate_type: "mid".into(), ..ok.clone() };
        assert_eq!(field_of(super::alert(&bad_type).unwrap_err()), "rateType");
        let zero = AlertRequest { value: 0.0, ..ok.clone() };
        assert_eq!(field_of(super::alert(&zero).unwrap_err()), "value");
        let nan = AlertRequest { value: f64::NAN, ..ok };
        assert_eq!(field_of(super::alert(&nan).unwrap_err()), "value");
    }

    #[test]
    fn test_rate_board_names_offending_field() {
        let board = RateBoard {
            usd_buy: 870.0,
            usd_sell: 880.0,
            eur_buy: 940.0,
            eur_sell: 955.0,
            zar_buy: 47.0,
            zar_sell: -1.0,
            cad_buy: 630.0,
            cad_sell: 640.0,
        };
        assert_eq!(field_of(rate_board(&board).unwrap_err()), "zarSell");
        assert_eq!(field_of(rate_board(&RateBoard::default()).unwrap_err()), "usdBuy");
    }

    #[test]
    fn test_simulation() {
        let ok = Simulation {
            amount: 100.0,
            from_currency: "USD".into(),
            to_currency: "aoa".into(),
        };
        assert_eq!(simulation(&ok).unwrap().from_currency, "usd");
        let same = Simulation { to_currency: "usd".into(), ..ok.clone() };
        assert_eq!(field_of(simulation(&same).unwrap_err()), "toCurrency");
        let negative = Simulation { amount: -5.0, ..ok };
        assert_eq!(field_of(simulation(&negative).unwrap_err()), "amount");
    }
}
