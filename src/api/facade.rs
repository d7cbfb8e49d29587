//! One method per backend capability.
//!
//! Each method validates its input, hands an [`ApiCall`] to the executor
//! and types the response. Retry, breaker and endpoint logic live in the
//! executor only.

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use url::form_urlencoded::byte_serialize;

use crate::api::types::{
    AdminUser, Alert, AlertRequest, AuthOutcome, AuthResponse, DailyRate, GoogleCredential,
    Listing, RateBoard, RatesExport, ServerMessage, Simulation,
};
use crate::api::validation;
use crate::error::{ApiError, ApiResult};
use crate::resilience::executor::{ApiCall, ResilientExecutor};
use crate::session::{ProfileHint, SessionStore, UserProfile};

#[derive(Debug, Clone)]
pub struct CambioApi {
    executor: Arc<ResilientExecutor>,
    session: Arc<SessionStore>,
    export_timeout: Duration,
}

impl CambioApi {
    pub fn new(executor: Arc<ResilientExecutor>, export_timeout: Duration) -> Self {
        let session = executor.session().clone();
        Self {
            executor,
            session,
            export_timeout,
        }
    }

    pub fn executor(&self) -> &Arc<ResilientExecutor> {
        &self.executor
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    // === Authentication ===

    pub async fn login(&self, email: &str, password: &str) -> ApiResult<AuthOutcome> {
        let email = validation::email(email)?;
        validation::password(password)?;
        let call = ApiCall::post("/auth/login")
            .body(serde_json::json!({ "email": email, "password": password }));
        let response = self.executor.execute::<AuthResponse>(call).await?;
        Ok(self.adopt(response))
    }

    pub async fn register(&self, email: &str, password: &str) -> ApiResult<AuthOutcome> {
        let email = validation::email(email)?;
        validation::password(password)?;
        let call = ApiCall::post("/auth/register")
            .body(serde_json::json!({ "email": email, "password": password }));
        let response = self.executor.execute::<AuthResponse>(call).await?;
        Ok(self.adopt(response))
    }

    pub async fn google_auth(&self, credential: &GoogleCredential) -> ApiResult<AuthOutcome> {
        let token = validation::required("credential", &credential.credential)?;
        let body = GoogleCredential {
            credential: token,
            client_id: credential.client_id.clone(),
        };
        let call = ApiCall::post("/auth/google").body(to_body(&body)?);
        let response = self.executor.execute::<AuthResponse>(call).await?;
        Ok(self.adopt(response))
    }

    /// Ask the backend whether the current token is still good. A fresh
    /// token in the answer replaces the stored one.
    pub async fn validate_session(&self) -> ApiResult<AuthOutcome> {
        let call = ApiCall::post("/auth/validate").with_auth();
        let mut response = self.executor.execute::<AuthResponse>(call).await?;
        if response.user.is_none() {
            response.user = self.session.profile().map(|p| ProfileHint {
                id: Some(p.id),
                email: Some(p.email),
                name: None,
                is_premium: Some(p.is_premium),
                is_admin: Some(p.is_admin),
            });
        }
        Ok(self.adopt(response))
    }

    /// End the session. Fails with `Storage` if the saved token could not
    /// be deleted; the session is over either way.
    pub fn logout(&self) -> ApiResult<()> {
        self.session.sign_out()?;
        Ok(())
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.session.profile()
    }

    // === Rates ===

    /// Published rates, newest first. Public.
    pub async fn fetch_rates(&self) -> ApiResult<Vec<DailyRate>> {
        let listing = self.executor.execute::<Listing<DailyRate>>(ApiCall::get("/rates")).await?;
        Ok(listing.into_vec())
    }

    pub async fn fetch_rate_stats(&self) -> ApiResult<serde_json::Value> {
        self.executor.execute(ApiCall::get("/rates/stats").with_auth()).await
    }

    pub async fn simulate_exchange(&self, request: &Simulation) -> ApiResult<serde_json::Value> {
        let request = validation::simulation(request)?;
        let call = ApiCall::post("/simulate").with_auth().body(to_body(&request)?);
        self.executor.execute(call).await
    }

    // === Alerts ===

    pub async fn create_alert(&self, request: &AlertRequest) -> ApiResult<ServerMessage> {
        let alert = validation::alert(request)?;
        let call = ApiCall::post("/alerts").with_auth().body(to_body(&alert)?);
        self.executor.execute(call).await
    }

    pub async fn delete_alert(&self, alert_id: &str) -> ApiResult<ServerMessage> {
        let id = validation::required("alertId", alert_id)?;
        let call = ApiCall::delete(format!("/alerts/{}", encode_segment(&id))).with_auth();
        self.executor.execute(call).await
    }

    pub async fn fetch_user_alerts(&self) -> ApiResult<Vec<Alert>> {
        let listing = self
            .executor
            .execute::<Listing<Alert>>(ApiCall::get("/alerts").with_auth())
            .await?;
        Ok(listing.into_vec())
    }

    // === User ===

    pub async fn save_phone_number(&self, phone: &str) -> ApiResult<ServerMessage> {
        let phone = validation::phone_number(phone)?;
        let call = ApiCall::post("/user/phone")
            .with_auth()
            .body(serde_json::json!({ "phoneNumber": phone }));
        self.executor.execute(call).await
    }

    // === Administration ===

    pub async fn admin_update_rates(&self, board: &RateBoard) -> ApiResult<ServerMessage> {
        validation::rate_board(board)?;
        let call = ApiCall::post("/admin/rates").with_auth().body(to_body(board)?);
        self.executor.execute(call).await
    }

    pub async fn admin_list_users(&self) -> ApiResult<Vec<AdminUser>> {
        let listing = self
            .executor
            .execute::<Listing<AdminUser>>(ApiCall::get("/admin/users").with_auth())
            .await?;
        Ok(listing.into_vec())
    }

    pub async fn admin_set_premium(&self, user_id: &str, is_premium: bool) -> ApiResult<ServerMessage> {
        let id = validation::user_id(user_id)?;
        let call = ApiCall::patch(format!("/admin/users/{}/premium", id))
            .with_auth()
            .body(serde_json::json!({ "isPremium": is_premium }));
        self.executor.execute(call).await
    }

    pub async fn admin_set_premium_by_email(&self, email: &str, is_premium: bool) -> ApiResult<ServerMessage> {
        let email = validation::email(email)?;
        let call = ApiCall::patch(format!("/admin/users/email/{}/premium", encode_segment(&email)))
            .with_auth()
            .body(serde_json::json!({ "isPremium": is_premium }));
        self.executor.execute(call).await
    }

    /// Looks the user up in the full user list.
    pub async fn admin_find_user_by_email(&self, email: &str) -> ApiResult<Option<AdminUser>> {
        let email = validation::email(email)?;
        let users = self.admin_list_users().await?;
        Ok(users.into_iter().find(|u| u.email.eq_ignore_ascii_case(&email)))
    }

    pub async fn admin_list_alerts(&self) -> ApiResult<Vec<Alert>> {
        let listing = self
            .executor
            .execute::<Listing<Alert>>(ApiCall::get("/admin/alerts").with_auth())
            .await?;
        Ok(listing.into_vec())
    }

    /// Download the rates workbook.
    pub async fn export_rates(&self) -> ApiResult<RatesExport> {
        let call = ApiCall::post("/export-rates")
            .with_auth()
            .timeout(self.export_timeout);
        let raw = self.executor.execute_bytes(call).await?;
        if raw.body.is_empty() {
            return Err(ApiError::Decode("export file is empty".to_string()));
        }
        let export = RatesExport {
            file_name: export_file_name(Utc::now().date_naive()),
            bytes: raw.body,
        };
        tracing::info!(file = %export.file_name, bytes = export.bytes.len(), "Rates exported");
        Ok(export)
    }

    /// Hand a returned token to the session store.
    fn adopt(&self, response: AuthResponse) -> AuthOutcome {
        let session_started = match response.token.as_deref() {
            Some(token) => {
                let accepted = self.session.login(token, response.user.as_ref());
                if !accepted {
                    tracing::warn!("Backend returned a token the session store rejected");
                }
                accepted
            }
            None => false,
        };
        AuthOutcome {
            response,
            session_started,
        }
    }
}

pub fn export_file_name(date: chrono::NaiveDate) -> String {
    format!("taxas_cambio_{}.xlsx", date.format("%Y-%m-%d"))
}

fn encode_segment(segment: &str) -> String {
    byte_serialize(segment.as_bytes()).collect()
}

fn to_body<T: serde::Serialize>(value: &T) -> ApiResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ApiError::validation("body", format!("cannot be encoded as JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_file_name() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 7, 5).unwrap();
        assert_eq!(export_file_name(date), "taxas_cambio_2024-07-05.xlsx");
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("ana@example.ao"), "ana%40example.ao");
        assert_eq!(encode_segment("64b7f0c2"), "64b7f0c2");
    }

    #[test]
    fn test_unencodable_body_is_a_validation_error() {
        let mut body = std::collections::HashMap::new();
        body.insert((1u8, 2u8), "non-string key");

        let err = to_body(&body).unwrap_err();
        assert!(matches!(err, ApiError::Validation { field: "body", .. }));
        assert_eq!(err.user_hint(), crate::error::UserHint::FixInput);
    }
}
