use metrics::{Meter, MetricsRegistry};

pub const SHARED_FREE_BUFFERS_GAUGE: &'static str = "producer:shared free buffers";

pub fn topic_meter_name(topic_name: &str, what: &str) -> String {
    format!("producer:topics:{}:{}", topic_name, what)
}

pub fn total_meter_name(what: &str) -> String {
    format!("producer:total:{}", what)
}

pub fn free_buffers_gauge_name(topic_name: &str) -> String {
    topic_meter_name(topic_name, "free buffers")
}

/// The meters one producer instance reports into, per topic and
/// process-wide.
pub struct ProducerMetrics {
    pub received: Meter,
    pub received_total: Meter,
    pub sent: Meter,
    pub sent_total: Meter,
    pub dropped_queue_full: Meter,
    pub dropped_queue_full_total: Meter,
    pub dropped_send_fail: Meter,
    pub dropped_send_fail_total: Meter,
}

impl ProducerMetrics {
    pub fn new(registry: &MetricsRegistry, topic_name: &str) -> Self {
        ProducerMetrics {
            received: registry.meter(&topic_meter_name(topic_name, "messages received")),
            received_total: registry.meter(&total_meter_name("messages received")),
            sent: registry.meter(&topic_meter_name(topic_name, "messages sent")),
            sent_total: registry.meter(&total_meter_name("messages sent")),
            dropped_queue_full:
                registry.meter(&topic_meter_name(topic_name, "messages dropped (queue full)")),
            dropped_queue_full_total:
                registry.meter(&total_meter_name("messages dropped (queue full)")),
            dropped_send_fail:
                registry.meter(&topic_meter_name(topic_name, "messages dropped (send failure)")),
            dropped_send_fail_total:
                registry.meter(&total_meter_name("messages dropped (send failure)")),
        }
    }

    pub fn mark_received(&self, records: usize) {
        self.received.mark(records);
        self.received_total.mark(records);
    }

    pub fn mark_sent(&self, records: usize) {
        self.sent.mark(records);
        self.sent_total.mark(records);
    }

    pub fn mark_dropped_queue_full(&self, records: usize) {
        self.dropped_queue_full.mark(records);
        self.dropped_queue_full_total.mark(records);
    }

    pub fn mark_dropped_send_fail(&self, records: usize) {
        self.dropped_send_fail.mark(records);
        self.dropped_send_fail_total.mark(records);
    }
}
