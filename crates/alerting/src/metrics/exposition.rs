use std::sync::Arc;

use super::alerting_metrics::AlertingMetrics;

pub fn render_prometheus(m: &Arc<AlertingMetrics>) -> String {
    let mut out = String::with_capacity(1024);

    write_counter(&mut out, "sentinel_alerting_jobs_scheduled_total", m.jobs_scheduled_val());
    write_counter(&mut out, "sentinel_alerting_jobs_skipped_total", m.jobs_skipped_val());
    write_counter(&mut out, "sentinel_alerting_eval_attempts_total", m.eval_attempts_val());
    write_counter(&mut out, "sentinel_alerting_eval_retries_total", m.eval_retries_val());
    write_counter(&mut out, "sentinel_alerting_eval_exhausted_total", m.eval_exhausted_val());
    write_counter(&mut out, "sentinel_alerting_state_transitions_total", m.state_transitions_val());
    write_counter(&mut out, "sentinel_alerting_notifications_sent_total", m.notifications_sent_val());
    write_counter(&mut out, "sentinel_alerting_notifications_failed_total", m.notifications_failed_val());

    let (sum, count) = m.execution_latency_vals();
    write_summary(&mut out, "sentinel_alerting_execution_latency_us", sum, count);

    out
}

fn write_counter(out: &mut String, name: &str, val: u64) {
    use std::fmt::Write;
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {val}");
}

fn write_summary(out: &mut String, name: &str, sum: u64, count: u64) {
    use std::fmt::Write;
    let _ = writeln!(out, "# TYPE {name} summary");
    let _ = writeln!(out, "{name}_sum {sum}");
    let _ = writeln!(out, "{name}_count {count}");
}
