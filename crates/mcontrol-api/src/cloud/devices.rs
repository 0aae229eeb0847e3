// Device listing and control endpoints

use tracing::{debug, warn};

use crate::auth::Session;
use crate::cloud::client::CloudClient;
use crate::cloud::models::{CONTROL_PATH, CloudDevice, ControlRequest, DETAILS_PATH, DetailsResult};
use crate::error::Error;

impl CloudClient {
    /// List every indoor unit across all areas, in listing order.
    ///
    /// Each device carries the name of the area it was listed under.
    pub async fn list_devices(&self, session: &Session) -> Result<Vec<CloudDevice>, Error> {
        let envelope = self
            .post_form::<DetailsResult>(DETAILS_PATH, session, &[])
            .await?;

        if !envelope.is_success() {
            return Err(Error::CloudApi {
                code: envelope.code,
                message: envelope.describe(),
            });
        }

        let Some(details) = envelope.result else {
            warn!("device listing returned no result");
            return Ok(Vec::new());
        };

        let devices: Vec<CloudDevice> = details
            .areas
            .into_iter()
            .flat_map(|area| {
                let name = area.name;
                area.data.into_iter().map(move |mut device| {
                    device.area.clone_from(&name);
                    device
                })
            })
            .collect();

        debug!(count = devices.len(), "listed cloud devices");
        Ok(devices)
    }

    /// Send a control write for one device.
    ///
    /// The JSON payload is sent as both the `control` and `operation` form
    /// fields. A non-success envelope maps to [`Error::CommandRejected`].
    pub async fn control(&self, session: &Session, request: &ControlRequest) -> Result<(), Error> {
        let payload = serde_json::to_string(request).map_err(|e| Error::Deserialization {
            message: format!("failed to encode control payload: {e}"),
            body: String::new(),
        })?;

        debug!(device_id = %request.id, %payload, "sending control");

        let envelope = self
            .post_form::<serde_json::Value>(
                CONTROL_PATH,
                session,
                &[("control", payload.as_str()), ("operation", payload.as_str())],
            )
            .await?;

        if !envelope.is_success() {
            return Err(Error::CommandRejected {
                device_id: request.id.clone(),
                message: envelope.describe(),
            });
        }

        Ok(())
    }
}
