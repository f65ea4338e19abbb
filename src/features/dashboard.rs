use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{TopicConsumer, decode_json, lenient, unexpected_topic};
use crate::bus::Publisher;
use crate::topics::{self, ControlWord};
use crate::utils::error::DecodeError;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Weather {
    #[serde(default)]
    pub location: String,
    #[serde(default, alias = "temperature")]
    pub temp_c: Option<f64>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Body of `dashboard/response`. Both halves are optional on the wire and
/// decoded independently; a malformed half reads as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub weather: Option<Weather>,
    #[serde(default, deserialize_with = "lenient")]
    pub integrations: Option<BTreeMap<String, bool>>,
}

#[derive(Debug, Default)]
pub struct DashboardView {
    weather: Option<Weather>,
    integrations: BTreeMap<String, bool>,
    updated_at: Option<DateTime<Utc>>,
}

impl DashboardView {
    pub fn weather(&self) -> Option<&Weather> {
        self.weather.as_ref()
    }

    pub fn integrations(&self) -> &BTreeMap<String, bool> {
        &self.integrations
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn request(&self, publisher: &Publisher) {
        publisher.publish(topics::DASHBOARD_REQUEST, ControlWord::Get);
    }
}

impl TopicConsumer for DashboardView {
    fn topics(&self) -> &'static [&'static str] {
        &[topics::DASHBOARD_RESPONSE]
    }

    fn apply(&mut self, topic: &str, payload: &str) -> Result<(), DecodeError> {
        if topic != topics::DASHBOARD_RESPONSE {
            return Err(unexpected_topic(topic));
        }
        let response: DashboardResponse = decode_json(topic, payload)?;
        if let Some(weather) = response.weather {
            self.weather = Some(weather);
        }
        if let Some(integrations) = response.integrations {
            self.integrations = integrations;
        }
        self.updated_at = Some(Utc::now());
        Ok(())
    }
}
