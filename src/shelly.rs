use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::config::DeviceConfig;
use crate::controller::SwitchState;
use crate::error::HttpError;

const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for Shelly gen1 relay and lamp devices.
///
/// `GET http://{addr}/relay/0` (or `/light/0`) reports the channel state;
/// the same path with `?turn=on|off` switches it. Switching is idempotent
/// at the physical device, so re-issuing the current state is harmless.
pub struct ShellyClient {
    client: reqwest::Client,
}

/// The subset of the channel status response we care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub ison: bool,
}

impl ShellyClient {
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(DEFAULT_IO_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Queries the current switch state of a device.
    pub async fn get_state(&self, device: &DeviceConfig) -> Result<SwitchState, HttpError> {
        let response = self.request(device, None).send().await?;
        if !response.status().is_success() {
            return Err(HttpError::Status(response.status()));
        }
        let status: ChannelStatus = response.json().await?;
        Ok(if status.ison {
            SwitchState::On
        } else {
            SwitchState::Off
        })
    }

    /// Commands a device on or off.
    pub async fn set_state(
        &self,
        device: &DeviceConfig,
        desired: SwitchState,
    ) -> Result<(), HttpError> {
        let turn = match desired {
            SwitchState::On => "on",
            SwitchState::Off => "off",
        };
        let response = self.request(device, Some(turn)).send().await?;
        if !response.status().is_success() {
            return Err(HttpError::Status(response.status()));
        }
        Ok(())
    }

    fn request(&self, device: &DeviceConfig, turn: Option<&str>) -> reqwest::RequestBuilder {
        let url = format!("http://{}/{}", device.addr, device.kind.channel_path());
        let mut builder = self.client.get(url);
        if let Some(turn) = turn {
            builder = builder.query(&[("turn", turn)]);
        }
        if let Some(auth) = &device.auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceAuth, DeviceKind};
    use mockito::Matcher;

    fn device(addr: String, kind: DeviceKind) -> DeviceConfig {
        DeviceConfig {
            id: "test_device".to_string(),
            addr,
            kind,
            high_threshold: 500.0,
            low_threshold: 100.0,
            auth: None,
        }
    }

    #[tokio::test]
    async fn test_get_state_on() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/relay/0")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ison": true, "has_timer": false, "source": "http"}"#)
            .create_async()
            .await;

        let client = ShellyClient::new().unwrap();
        let dev = device(server.host_with_port(), DeviceKind::Relay);
        let state = client.get_state(&dev).await.unwrap();

        assert_eq!(state, SwitchState::On);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_state_off_lamp_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/light/0")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ison": false}"#)
            .create_async()
            .await;

        let client = ShellyClient::new().unwrap();
        let dev = device(server.host_with_port(), DeviceKind::Lamp);
        let state = client.get_state(&dev).await.unwrap();

        assert_eq!(state, SwitchState::Off);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_state_non_2xx_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/relay/0")
            .with_status(500)
            .create_async()
            .await;

        let client = ShellyClient::new().unwrap();
        let dev = device(server.host_with_port(), DeviceKind::Relay);
        let err = client.get_state(&dev).await.expect_err("should fail");

        assert!(matches!(err, HttpError::Status(status) if status.as_u16() == 500));
    }

    #[tokio::test]
    async fn test_get_state_malformed_body_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/relay/0")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("not json")
            .create_async()
            .await;

        let client = ShellyClient::new().unwrap();
        let dev = device(server.host_with_port(), DeviceKind::Relay);
        let err = client.get_state(&dev).await.expect_err("should fail");

        assert!(matches!(err, HttpError::Request(_)));
    }

    #[tokio::test]
    async fn test_set_state_sends_turn_on() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/relay/0")
            .match_query(Matcher::UrlEncoded("turn".into(), "on".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ison": true}"#)
            .create_async()
            .await;

        let client = ShellyClient::new().unwrap();
        let dev = device(server.host_with_port(), DeviceKind::Relay);
        client.set_state(&dev, SwitchState::On).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_state_is_idempotent() {
        // An already-on device answers the same way; issuing "on" twice must
        // not error.
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/relay/0")
            .match_query(Matcher::UrlEncoded("turn".into(), "on".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ison": true}"#)
            .expect(2)
            .create_async()
            .await;

        let client = ShellyClient::new().unwrap();
        let dev = device(server.host_with_port(), DeviceKind::Relay);
        client.set_state(&dev, SwitchState::On).await.unwrap();
        client.set_state(&dev, SwitchState::On).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_state_off_with_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/relay/0")
            .match_query(Matcher::UrlEncoded("turn".into(), "off".into()))
            // base64("admin:secret")
            .match_header("Authorization", "Basic YWRtaW46c2VjcmV0")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ison": false}"#)
            .create_async()
            .await;

        let client = ShellyClient::new().unwrap();
        let mut dev = device(server.host_with_port(), DeviceKind::Relay);
        dev.auth = Some(DeviceAuth {
            username: "admin".to_string(),
            password: "secret".to_string(),
        });
        client.set_state(&dev, SwitchState::Off).await.unwrap();

        mock.assert_async().await;
    }
}
