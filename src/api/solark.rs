mod auth;
mod error;
mod models;

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub use self::{auth::AuthMode, error::Error, models::RawPlantRecord};
use self::{
    auth::{LoginStrategy, Session, extract_expires_in, extract_token},
    models::{check_envelope, first_of, is_explicit_failure, vendor_message},
};

const LOGIN_ENDPOINT: &str = "/rest/account/login";
const PLANT_DATA_ENDPOINT: &str = "/rest/plant/getPlantData";

const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);
const DATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Flow-summary fields that overwrite live telemetry on merge: the flow
/// endpoint computes these on the meter side and is authoritative for them.
const FLOW_OVERLAY_KEYS: [&str; 7] =
    ["pvPower", "battPower", "gridOrMeterPower", "loadOrEpsPower", "soc", "toGrid", "gridTo"];

/// Sol-Ark Cloud client: owns the credentials and the cached bearer session.
pub struct Api {
    client: Client,
    base_url: String,
    api_url: String,
    email: String,
    password: String,
    auth_mode: AuthMode,
    session: Mutex<Option<Session>>,
}

impl Api {
    pub fn try_new(
        email: &str,
        password: &str,
        base_url: &str,
        api_url: Option<&str>,
        auth_mode: AuthMode,
    ) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(concat!("solark-cloud/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = base_url.trim_end_matches('/').to_owned();
        let api_url =
            api_url.map_or_else(|| base_url.clone(), |url| url.trim_end_matches('/').to_owned());
        Ok(Self {
            client,
            base_url,
            api_url,
            email: email.to_owned(),
            password: password.to_owned(),
            auth_mode,
            session: Mutex::new(None),
        })
    }

    /// Obtains a bearer session, trying the configured login strategies in
    /// order.
    ///
    /// Only one login attempt is ever in flight: concurrent callers queue on
    /// the session lock and adopt the winner's token instead of issuing
    /// duplicate logins.
    #[instrument(skip_all)]
    pub async fn authenticate(&self) -> Result<(), Error> {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(Session::is_valid) {
            return Ok(());
        }
        *session = Some(self.login().await?);
        Ok(())
    }

    /// Clears the cached session; the next call logs in afresh.
    pub async fn invalidate(&self) {
        *self.session.lock().await = None;
    }

    /// Login plus a plant-data round trip. Returns the plant's display name;
    /// the error taxonomy distinguishes bad credentials from a bad plant id.
    pub async fn validate(&self, plant_id: &str) -> Result<String, Error> {
        self.authenticate().await?;
        let plant = self.get_plant_data(plant_id).await?;
        Ok(plant
            .get("plantName")
            .and_then(Value::as_str)
            .map_or_else(|| format!("Plant {plant_id}"), ToOwned::to_owned))
    }

    /// Classic plant summary from `/rest/plant/getPlantData`.
    #[instrument(skip_all, fields(plant_id = plant_id))]
    pub async fn get_plant_data(&self, plant_id: &str) -> Result<RawPlantRecord, Error> {
        #[derive(Serialize)]
        struct GetPlantDataRequest<'a> {
            #[serde(rename = "plantId")]
            plant_id: &'a str,
        }

        let token = self.bearer_token().await?;
        let response = self
            .client
            .post(format!("{}{PLANT_DATA_ENDPOINT}", self.base_url))
            .timeout(DATA_TIMEOUT)
            .bearer_auth(token)
            .json(&GetPlantDataRequest { plant_id })
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.invalidate().await;
            return Err(Error::Auth("token expired or rejected (401)".to_owned()));
        }
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(error::data_status(status, &body));
        }

        let body: Value = response.json().await?;
        if is_explicit_failure(&body) {
            let message = vendor_message(&body, "unknown error").to_owned();
            let lowered = message.to_lowercase();
            if lowered.contains("token") || lowered.contains("auth") {
                self.invalidate().await;
                return Err(Error::Auth(message));
            }
            return Err(Error::Api(message));
        }
        models::plant_payload(body)
            .ok_or_else(|| Error::Api(format!("no plant data returned for plant {plant_id}")))
    }

    /// One polling cycle's raw record: live telemetry for the plant's first
    /// inverter, inverter-entry energy counters filling gaps, and the flow
    /// summary overlaid on top.
    ///
    /// A plant without inverters (or without a serial number on the first
    /// one) yields an empty record: absent hardware is not a transport error.
    #[instrument(skip_all, fields(plant_id = plant_id))]
    pub async fn fetch_telemetry(&self, plant_id: &str) -> Result<RawPlantRecord, Error> {
        #[derive(Serialize)]
        struct InverterListQuery<'a> {
            page: u32,
            limit: u32,
            #[serde(rename = "stationId")]
            station_id: &'a str,
            status: i32,
            sn: &'a str,
            #[serde(rename = "type")]
            kind: i32,
        }

        let inverters = self
            .get_json(
                &format!("{}/api/v1/plant/{plant_id}/inverters", self.api_url),
                &InverterListQuery {
                    page: 1,
                    limit: 10,
                    station_id: plant_id,
                    status: -1,
                    sn: "",
                    kind: -2,
                },
            )
            .await?;
        let Some(first) = models::first_inverter(&inverters) else {
            warn!(plant_id, "no inverters found");
            return Ok(RawPlantRecord::new());
        };
        let Some(serial_number) =
            first_of(first, &["sn", "deviceSn"]).and_then(Value::as_str).map(ToOwned::to_owned)
        else {
            warn!(plant_id, "first inverter has no serial number");
            return Ok(RawPlantRecord::new());
        };
        let energy_today = first.get("etoday").cloned();
        let energy_total = first.get("etotal").cloned();

        let live = self
            .get_json(
                &format!("{}/api/v1/dy/store/{serial_number}/read", self.api_url),
                &[("sn", serial_number.as_str())],
            )
            .await?;
        let mut record = models::live_record(live);
        debug!(serial_number = %serial_number, n_keys = record.len(), "live telemetry");

        // Inverter-entry counters only fill gaps; live data wins ties.
        if let Some(value) = energy_today {
            record.entry("energyToday").or_insert(value);
        }
        if let Some(value) = energy_total {
            record.entry("energyTotal").or_insert(value);
        }

        // Flow data is an enhancement; a failed summary never fails the cycle.
        let date = Utc::now().format("%Y-%m-%d").to_string();
        match self
            .get_json(
                &format!("{}/api/v1/plant/energy/{plant_id}/flow", self.api_url),
                &[("date", date.as_str())],
            )
            .await
        {
            Ok(flow) => {
                if let Some(flow) = flow.get("data").and_then(Value::as_object) {
                    for key in FLOW_OVERLAY_KEYS {
                        if let Some(value) = flow.get(key) {
                            record.insert(key.to_owned(), value.clone());
                        }
                    }
                }
            }
            Err(error) => warn!(%error, "flow summary unavailable"),
        }

        Ok(record)
    }

    async fn login(&self) -> Result<Session, Error> {
        let mut failures = Vec::new();
        for strategy in self.auth_mode.strategies() {
            match self.login_with(*strategy).await {
                Ok(session) => {
                    info!(strategy = strategy.name(), "logged in");
                    return Ok(session);
                }
                // Credential-level: the next strategy may still work.
                Err(Error::Auth(message)) => {
                    debug!(strategy = strategy.name(), message = %message, "login rejected");
                    failures.push(format!("{}: {message}", strategy.name()));
                }
                // Environment-level: falling through to the next strategy
                // would mask an outage as bad credentials.
                Err(error) => return Err(error),
            }
        }
        Err(Error::Auth(format!("all login strategies failed: {}", failures.join(" | "))))
    }

    #[instrument(skip_all, fields(strategy = strategy.name()))]
    async fn login_with(&self, strategy: LoginStrategy) -> Result<Session, Error> {
        let response = self
            .client
            .post(format!("{}{LOGIN_ENDPOINT}", self.base_url))
            .timeout(LOGIN_TIMEOUT)
            .json(&strategy.request(&self.email, &self.password))
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(error::login_status(status, &body));
        }

        let body: Value = response.json().await?;
        if let Some(token) = extract_token(&body) {
            return Ok(Session::new(token.to_owned(), extract_expires_in(&body)));
        }
        if is_explicit_failure(&body) {
            return Err(Error::Auth(vendor_message(&body, "authentication failed").to_owned()));
        }
        Err(Error::Api("login response carries no token".to_owned()))
    }

    /// A valid bearer token, logging in first when the cached session is
    /// absent or past its expiry.
    async fn bearer_token(&self) -> Result<String, Error> {
        let mut session = self.session.lock().await;
        if let Some(session) = session.as_ref().filter(|session| session.is_valid()) {
            return Ok(session.token.clone());
        }
        let fresh = self.login().await?;
        let token = fresh.token.clone();
        *session = Some(fresh);
        Ok(token)
    }

    async fn get_json<Q: Serialize + ?Sized>(&self, url: &str, query: &Q) -> Result<Value, Error> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .get(url)
            .timeout(DATA_TIMEOUT)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.invalidate().await;
            return Err(Error::Auth("token expired or rejected (401)".to_owned()));
        }
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(error::data_status(status, &body));
        }
        let body: Value = response.json().await?;
        check_envelope(&body, url)?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    use super::*;

    fn api(server: &ServerGuard, auth_mode: AuthMode) -> Api {
        Api::try_new("user@example.com", "hunter2", &server.url(), None, auth_mode).unwrap()
    }

    #[tokio::test]
    async fn test_strict_login_sends_grant_type() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/account/login")
            .match_body(Matcher::PartialJson(json!({
                "email": "user@example.com",
                "grant_type": "password",
            })))
            .with_status(200)
            .with_body(json!({"data": {"token": "t-1", "expires_in": 3600}}).to_string())
            .create_async()
            .await;

        api(&server, AuthMode::Strict).authenticate().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_auto_falls_back_to_legacy_on_credential_rejection() {
        let mut server = Server::new_async().await;
        let strict = server
            .mock("POST", "/rest/account/login")
            .match_body(Matcher::PartialJson(json!({"grant_type": "password"})))
            .with_status(401)
            .create_async()
            .await;
        let legacy = server
            .mock("POST", "/rest/account/login")
            .match_body(Matcher::PartialJson(json!({"username": "user@example.com"})))
            .with_status(200)
            .with_body(json!({"token": "legacy-token"}).to_string())
            .create_async()
            .await;

        api(&server, AuthMode::Auto).authenticate().await.unwrap();
        strict.assert_async().await;
        legacy.assert_async().await;
    }

    #[tokio::test]
    async fn test_auto_propagates_connection_error_without_fallback() {
        let mut server = Server::new_async().await;
        let strict = server
            .mock("POST", "/rest/account/login")
            .match_body(Matcher::PartialJson(json!({"grant_type": "password"})))
            .with_status(502)
            .create_async()
            .await;
        let legacy = server
            .mock("POST", "/rest/account/login")
            .match_body(Matcher::PartialJson(json!({"username": "user@example.com"})))
            .expect(0)
            .create_async()
            .await;

        let error = api(&server, AuthMode::Auto).authenticate().await.unwrap_err();
        assert!(matches!(error, Error::Connection(_)));
        strict.assert_async().await;
        legacy.assert_async().await;
    }

    #[tokio::test]
    async fn test_auto_aggregates_all_rejections() {
        let mut server = Server::new_async().await;
        let login = server
            .mock("POST", "/rest/account/login")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        let error = api(&server, AuthMode::Auto).authenticate().await.unwrap_err();
        let Error::Auth(message) = error else {
            panic!("expected an auth error, got {error:?}");
        };
        assert!(message.contains("strict:"));
        assert!(message.contains("legacy:"));
        login.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_surfaces_explicit_failure_message() {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", "/rest/account/login")
            .with_status(200)
            .with_body(json!({"success": false, "msg": "bad password"}).to_string())
            .create_async()
            .await;

        let error = api(&server, AuthMode::Legacy).authenticate().await.unwrap_err();
        assert!(matches!(&error, Error::Auth(message) if message.contains("bad password")));
    }

    #[tokio::test]
    async fn test_login_without_token_is_an_api_error() {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", "/rest/account/login")
            .with_status(200)
            .with_body(json!({"success": true}).to_string())
            .create_async()
            .await;

        let error = api(&server, AuthMode::Strict).authenticate().await.unwrap_err();
        assert!(matches!(error, Error::Api(_)));
    }

    #[tokio::test]
    async fn test_login_rate_limit() {
        let mut server = Server::new_async().await;
        let _login = server.mock("POST", "/rest/account/login").with_status(429).create_async().await;

        let error = api(&server, AuthMode::Strict).authenticate().await.unwrap_err();
        assert!(matches!(error, Error::RateLimit(_)));
    }

    #[tokio::test]
    async fn test_concurrent_authentication_logs_in_once() {
        let mut server = Server::new_async().await;
        let login = server
            .mock("POST", "/rest/account/login")
            .with_status(200)
            .with_body(json!({"data": {"access_token": "t-2"}}).to_string())
            .expect(1)
            .create_async()
            .await;

        let api = api(&server, AuthMode::Strict);
        let (first, second) = tokio::join!(api.authenticate(), api.authenticate());
        first.unwrap();
        second.unwrap();
        login.assert_async().await;
    }

    fn mock_login(server: &mut ServerGuard) -> mockito::Mock {
        server
            .mock("POST", "/rest/account/login")
            .with_status(200)
            .with_body(json!({"data": {"token": "t-3", "expires_in": 3600}}).to_string())
    }

    #[tokio::test]
    async fn test_fetch_telemetry_merges_live_inverter_and_flow_data() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server).create_async().await;
        let _inverters = server
            .mock("GET", "/api/v1/plant/PLANT1/inverters")
            .match_query(Matcher::UrlEncoded("stationId".into(), "PLANT1".into()))
            .with_status(200)
            .with_body(
                json!({
                    "code": 0,
                    "data": {"infos": [{"sn": "SN-1", "etoday": 12.5, "etotal": 998.0}]},
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _live = server
            .mock("GET", "/api/v1/dy/store/SN-1/read")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "code": 0,
                    "data": {"pvPower": 100, "energyToday": 13.0, "curVolt": 48.0},
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _flow = server
            .mock("GET", "/api/v1/plant/energy/PLANT1/flow")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "code": 0,
                    "data": {"pvPower": 450, "soc": 77, "toGrid": true, "gridOrMeterPower": -120},
                })
                .to_string(),
            )
            .create_async()
            .await;

        let record = api(&server, AuthMode::Strict).fetch_telemetry("PLANT1").await.unwrap();
        // Flow wins its allow-listed keys, live data wins the energy tie,
        // and the inverter entry only backfills what live data lacked.
        assert_eq!(record.get("pvPower"), Some(&json!(450)));
        assert_eq!(record.get("energyToday"), Some(&json!(13.0)));
        assert_eq!(record.get("energyTotal"), Some(&json!(998.0)));
        assert_eq!(record.get("soc"), Some(&json!(77)));
        assert_eq!(record.get("toGrid"), Some(&json!(true)));
        assert_eq!(record.get("curVolt"), Some(&json!(48.0)));
    }

    #[tokio::test]
    async fn test_fetch_telemetry_tolerates_flow_failure() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server).create_async().await;
        let _inverters = server
            .mock("GET", "/api/v1/plant/PLANT1/inverters")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"code": 0, "data": {"infos": [{"deviceSn": "SN-2"}]}}).to_string())
            .create_async()
            .await;
        let _live = server
            .mock("GET", "/api/v1/dy/store/SN-2/read")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"code": 0, "data": {"pvPower": 250}}).to_string())
            .create_async()
            .await;
        let _flow = server
            .mock("GET", "/api/v1/plant/energy/PLANT1/flow")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let record = api(&server, AuthMode::Strict).fetch_telemetry("PLANT1").await.unwrap();
        assert_eq!(record.get("pvPower"), Some(&json!(250)));
        assert!(!record.contains_key("soc"));
    }

    #[tokio::test]
    async fn test_fetch_telemetry_without_inverters_yields_empty_record() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server).create_async().await;
        let _inverters = server
            .mock("GET", "/api/v1/plant/PLANT1/inverters")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"code": 0, "data": {"infos": []}}).to_string())
            .create_async()
            .await;

        let record = api(&server, AuthMode::Strict).fetch_telemetry("PLANT1").await.unwrap();
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_telemetry_without_serial_yields_empty_record() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server).create_async().await;
        let _inverters = server
            .mock("GET", "/api/v1/plant/PLANT1/inverters")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"code": 0, "data": {"infos": [{"alias": "garage"}]}}).to_string())
            .create_async()
            .await;

        let record = api(&server, AuthMode::Strict).fetch_telemetry("PLANT1").await.unwrap();
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_telemetry_surfaces_envelope_code() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server).create_async().await;
        let _inverters = server
            .mock("GET", "/api/v1/plant/PLANT1/inverters")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"code": 0, "data": {"infos": [{"sn": "SN-3"}]}}).to_string())
            .create_async()
            .await;
        let _live = server
            .mock("GET", "/api/v1/dy/store/SN-3/read")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"code": 102, "msg": "device offline"}).to_string())
            .create_async()
            .await;

        let error = api(&server, AuthMode::Strict).fetch_telemetry("PLANT1").await.unwrap_err();
        assert!(matches!(&error, Error::Api(message) if message.contains("device offline")));
    }

    #[tokio::test]
    async fn test_data_401_invalidates_the_session() {
        let mut server = Server::new_async().await;
        let login = mock_login(&mut server).expect(2).create_async().await;
        let _plant = server
            .mock("POST", "/rest/plant/getPlantData")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        let api = api(&server, AuthMode::Strict);
        for _ in 0..2 {
            let error = api.get_plant_data("PLANT1").await.unwrap_err();
            assert!(matches!(error, Error::Auth(_)));
        }
        // Two logins prove the 401 cleared the cached session each time.
        login.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_plant_data_unwraps_alternate_envelopes() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server).create_async().await;
        let _plant = server
            .mock("POST", "/rest/plant/getPlantData")
            .match_body(Matcher::PartialJson(json!({"plantId": "PLANT1"})))
            .with_status(200)
            .with_body(json!({"Data": {"plantName": "Home", "pac": 1500}}).to_string())
            .create_async()
            .await;

        let plant = api(&server, AuthMode::Strict).get_plant_data("PLANT1").await.unwrap();
        assert_eq!(plant.get("plantName"), Some(&json!("Home")));
        assert_eq!(plant.get("pac"), Some(&json!(1500)));
    }

    #[tokio::test]
    async fn test_get_plant_data_maps_token_flavoured_failures_to_auth() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server).expect(2).create_async().await;
        let _plant = server
            .mock("POST", "/rest/plant/getPlantData")
            .with_status(200)
            .with_body(json!({"success": false, "msg": "Token has expired"}).to_string())
            .expect(2)
            .create_async()
            .await;

        let api = api(&server, AuthMode::Strict);
        let error = api.get_plant_data("PLANT1").await.unwrap_err();
        assert!(matches!(error, Error::Auth(_)));
        // The embedded token failure cleared the session like a real 401.
        let error = api.get_plant_data("PLANT1").await.unwrap_err();
        assert!(matches!(error, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_get_plant_data_maps_other_failures_to_api() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server).create_async().await;
        let _plant = server
            .mock("POST", "/rest/plant/getPlantData")
            .with_status(200)
            .with_body(json!({"success": false, "msg": "no such plant"}).to_string())
            .create_async()
            .await;

        let error =
            api(&server, AuthMode::Strict).get_plant_data("PLANT1").await.unwrap_err();
        assert!(matches!(&error, Error::Api(message) if message.contains("no such plant")));
    }

    #[tokio::test]
    async fn test_validate_reports_the_plant_name() {
        let mut server = Server::new_async().await;
        let _login = mock_login(&mut server).create_async().await;
        let _plant = server
            .mock("POST", "/rest/plant/getPlantData")
            .with_status(200)
            .with_body(json!({"data": {"plantName": "Lakehouse"}}).to_string())
            .create_async()
            .await;

        let name = api(&server, AuthMode::Strict).validate("PLANT1").await.unwrap();
        assert_eq!(name, "Lakehouse");
    }
}
