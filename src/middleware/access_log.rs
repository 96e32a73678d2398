//! Per-call access logging.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AccessLogConfig;
use crate::middleware::{Interceptor, Next};
use crate::rpc::{CallContext, CallInfo, CallResult, Code, Message};

/// Emits one record per call whose status passes the allow-list.
pub struct AccessLog {
    status_codes: HashSet<Code>,
}

impl AccessLog {
    pub fn new(config: &AccessLogConfig) -> Self {
        Self {
            status_codes: config
                .status_code_filters
                .iter()
                .filter_map(|&code| Code::try_from_i32(code))
                .collect(),
        }
    }

    fn should_log(&self, code: Code) -> bool {
        self.status_codes.is_empty() || self.status_codes.contains(&code)
    }
}

#[async_trait]
impl Interceptor for AccessLog {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Message,
        info: Arc<CallInfo>,
        next: Next,
    ) -> CallResult {
        let logged_body = redact(&request, info.redacted_fields());

        let result = next.run(ctx, request).await;
        let code = match &result {
            Ok(_) => Code::Ok,
            Err(status) => status.code(),
        };
        if !self.should_log(code) {
            return result;
        }

        match &result {
            Ok(_) => tracing::info!(
                service = %info.service(),
                method = %info.method(),
                status_code = code.as_i32(),
                status = %code,
                "rpc call"
            ),
            Err(status) => tracing::error!(
                service = %info.service(),
                method = %info.method(),
                status_code = code.as_i32(),
                status = %code,
                request_body = %logged_body,
                error = %status.message(),
                "rpc call"
            ),
        }
        result
    }
}

/// Deep copy of `message` with every `fields` key removed at any depth.
pub fn redact(message: &Message, fields: &[&str]) -> Message {
    let mut copy = message.clone();
    strip(&mut copy, fields);
    copy
}

fn strip(value: &mut Message, fields: &[&str]) {
    match value {
        Message::Object(map) => {
            map.retain(|key, _| !fields.contains(&key.as_str()));
            for child in map.values_mut() {
                strip(child, fields);
            }
        }
        Message::Array(items) => {
            for item in items {
                strip(item, fields);
            }
        }
        _ => {}
    }
}
