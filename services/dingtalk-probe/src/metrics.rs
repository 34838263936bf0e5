//! Prometheus exposition for the token lifecycle counters
//!
//! The counters themselves are recorded by `dingtalk-session`; this module
//! installs the recorder and attaches descriptions so `--metrics` output is
//! self-explanatory.

use dingtalk_session::metrics::{
    CALL_ERRORS_TOTAL, CALL_RETRIES_TOTAL, REFRESH_JOINED_TOTAL, REFRESH_TOTAL,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    Ok(handle)
}

/// Register descriptions for the session counters with the active recorder.
pub fn describe() {
    metrics::describe_counter!(REFRESH_TOTAL, "Token refreshes by outcome");
    metrics::describe_counter!(
        REFRESH_JOINED_TOTAL,
        "Callers that waited on a refresh already in flight"
    );
    metrics::describe_counter!(
        CALL_RETRIES_TOTAL,
        "Operations re-run after a token refresh"
    );
    metrics::describe_counter!(CALL_ERRORS_TOTAL, "Failed call attempts by error kind");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dingtalk_session::ErrorKind;
    use metrics_exporter_prometheus::PrometheusRecorder;

    /// Create an isolated recorder/handle pair for unit tests.
    /// Uses build_recorder() instead of install_recorder() to avoid the
    /// global recorder singleton constraint.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn describe_does_not_panic_without_recorder() {
        describe();
    }

    #[test]
    fn rendered_output_carries_descriptions() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        describe();
        dingtalk_session::metrics::record_refresh("success");
        dingtalk_session::metrics::record_call_error(ErrorKind::TokenExpired);

        let output = handle.render();
        assert!(
            output.contains("# HELP dingtalk_token_refresh_total Token refreshes by outcome"),
            "refresh counter must carry its description, got:\n{output}"
        );
        assert!(output.contains("dingtalk_token_refresh_total{outcome=\"success\"} 1"));
        assert!(output.contains("dingtalk_call_errors_total{kind=\"token_expired\"} 1"));
    }
}
