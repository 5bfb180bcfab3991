#[test]
fn render_lists_harness_metrics_after_init() {
    hive_obs::init();
    hive_obs::record_attempt();
    hive_obs::record_failure("timeout");
    hive_obs::observe_latency(0.3);
    let text = hive_obs::render();
    assert!(text.contains("hive_attempts_total"));
    assert!(text.contains("hive_attempt_failures_total{kind=\"timeout\"}"));
    assert!(text.contains("hive_request_latency_seconds_bucket"));
}
