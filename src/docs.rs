use utoipa::OpenApi;
use crate::{commands, handlers, models};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_devices,
        handlers::send_command,
        handlers::broadcast_command,
    ),
    components(
        schemas(
            commands::Command,
            models::CommandRequest,
            models::BroadcastResponse,
            models::DeviceConfig,
            models::DeviceSnapshot,
            models::DeviceStatus,
            models::PowerState,
            models::ShutterState,
            models::StatusChanged,
            models::WsMessage,
        )
    )
)]
pub struct ApiDoc;
