use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use crate::{server::AppState, utils};

pub async fn ping(State(state): State<AppState>) -> Json<Value> {
    let locate = |program: &str| {
        utils::find_executable(program)
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "not found".to_string())
    };

    Json(json!({
        "ok": true,
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "ffmpeg": locate(&state.config.ffmpeg_bin),
        "ytdlp": locate(&state.config.ytdlp_bin),
        "providers": state.orchestrator.provider_names(),
    }))
}
