use vela_stt::diarize::LabelMode;

use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("VELA_STT_RECHECK_INTERVAL_SECS") {
            match v.parse::<u64>() {
                Ok(secs) => self.stt.recheck_interval_secs = secs,
                Err(_) => tracing::warn!("ignoring invalid VELA_STT_RECHECK_INTERVAL_SECS value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("VELA_STT_REQUEST_TIMEOUT_SECS") {
            match v.parse::<u64>() {
                Ok(secs) => self.stt.request_timeout_secs = secs,
                Err(_) => tracing::warn!("ignoring invalid VELA_STT_REQUEST_TIMEOUT_SECS value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("VELA_STT_DEFAULT_LANGUAGE")
            && !v.trim().is_empty()
        {
            self.stt.default_language = v.trim().to_owned();
        }
        if let Ok(v) = std::env::var("VELA_STT_SYSTEM_AUDIO_LABEL_MODE") {
            if let Ok(mode) =
                serde_json::from_value::<LabelMode>(serde_json::Value::String(v.to_lowercase()))
            {
                self.stt.system_audio.label_mode = Some(mode);
            } else {
                tracing::warn!("ignoring invalid VELA_STT_SYSTEM_AUDIO_LABEL_MODE value: {v}");
            }
        }
    }
}
