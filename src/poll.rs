//! The polling loop: fetch, normalize, publish, repeat.

use std::time::Duration;

use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};

use crate::{
    api::solark::{Api, Error as ApiError},
    normalize::normalize,
    prelude::*,
    reading::Reading,
};

pub struct Poller {
    api: Api,
    plant_id: String,
    interval: Duration,
}

impl Poller {
    #[must_use]
    pub const fn new(api: Api, plant_id: String, interval: Duration) -> Self {
        Self { api, plant_id, interval }
    }

    /// One fetch-and-normalize cycle, with a single re-login retry when the
    /// token turns out to be stale. A second authentication failure bubbles
    /// up as-is: that is a credentials problem, not a hiccup.
    #[instrument(skip_all)]
    pub async fn refresh(&self) -> Result<Reading, ApiError> {
        match self.cycle().await {
            Err(ApiError::Auth(message)) => {
                debug!(message = %message, "re-authenticating once");
                self.api.authenticate().await?;
                self.cycle().await
            }
            outcome => outcome,
        }
    }

    async fn cycle(&self) -> Result<Reading, ApiError> {
        let record = self.api.fetch_telemetry(&self.plant_id).await?;
        Ok(normalize(&record))
    }

    /// Runs until cancelled or until the credentials stop working.
    ///
    /// At most one cycle is ever in flight: the loop is sequential and a
    /// slow cycle delays the next tick instead of stacking up. Transient
    /// failures keep the previously published reading in place.
    pub async fn run(&self, publisher: &watch::Sender<Option<Reading>>) -> Result {
        let mut ticks = time::interval(self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            match self.refresh().await {
                Ok(reading) => {
                    info!(n_values = reading.len(), "updated");
                    publisher.send_replace(Some(reading));
                }
                Err(error) if error.is_transient() => {
                    warn!(%error, "update failed, retrying next cycle");
                }
                Err(error) => {
                    return Err(error).context("credentials rejected, reconfiguration required");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;
    use crate::{api::solark::AuthMode, sensor};

    #[tokio::test]
    async fn test_refresh_produces_a_normalized_reading() {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", "/rest/account/login")
            .with_status(200)
            .with_body(json!({"data": {"token": "t", "expires_in": 3600}}).to_string())
            .create_async()
            .await;
        let _inverters = server
            .mock("GET", "/api/v1/plant/PLANT1/inverters")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"code": 0, "data": {"infos": [{"sn": "SN-1", "etoday": 7.5}]}}).to_string())
            .create_async()
            .await;
        let _live = server
            .mock("GET", "/api/v1/dy/store/SN-1/read")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"code": 0, "data": {"meterA": 120.0, "soc": 55}}).to_string())
            .create_async()
            .await;
        let _flow = server
            .mock("GET", "/api/v1/plant/energy/PLANT1/flow")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"code": 0, "data": {"pvPower": 800.0}}).to_string())
            .create_async()
            .await;

        let api =
            Api::try_new("user@example.com", "hunter2", &server.url(), None, AuthMode::Strict)
                .unwrap();
        let poller = Poller::new(api, "PLANT1".to_owned(), Duration::from_secs(120));
        let reading = poller.refresh().await.unwrap();

        assert_eq!(reading.get(sensor::PV_POWER), Some(800.0));
        assert_eq!(reading.get(sensor::BATTERY_SOC), Some(55.0));
        assert_eq!(reading.get(sensor::GRID_IMPORT_POWER), Some(120.0));
        assert_eq!(reading.get(sensor::ENERGY_TODAY), Some(7.5));
    }

    #[tokio::test]
    async fn test_refresh_reauthenticates_exactly_once() {
        let mut server = Server::new_async().await;
        let login = server
            .mock("POST", "/rest/account/login")
            .with_status(200)
            .with_body(json!({"data": {"token": "t", "expires_in": 3600}}).to_string())
            .expect(2)
            .create_async()
            .await;
        let inverters = server
            .mock("GET", "/api/v1/plant/PLANT1/inverters")
            .match_query(Matcher::Any)
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        let api =
            Api::try_new("user@example.com", "hunter2", &server.url(), None, AuthMode::Strict)
                .unwrap();
        let poller = Poller::new(api, "PLANT1".to_owned(), Duration::from_secs(120));
        let error = poller.refresh().await.unwrap_err();

        // One original attempt plus exactly one retry after re-login.
        assert!(matches!(error, ApiError::Auth(_)));
        login.assert_async().await;
        inverters.assert_async().await;
    }
}
