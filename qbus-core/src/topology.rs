// qbus-core/src/topology.rs

/// Naming convention for the shared exchange and the per-service queues and
/// routing keys. The exchange is shared across services; everything else is
/// derived from the service name and topic.
#[derive(Debug, Clone)]
pub struct Topology {
    pub exchange: String,
    pub service: String,
    pub topic: String,
}

impl Topology {
    pub fn new(
        exchange: impl Into<String>,
        service: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            service: service.into(),
            topic: topic.into(),
        }
    }

    /// Durable queue the service consumes requests from.
    pub fn request_queue(&self) -> String {
        format!("{}_req", self.service)
    }

    /// Routing key for outgoing requests; a qid suffix is appended per
    /// request when a reply is expected.
    pub fn request_routing_key(&self) -> String {
        format!("{}.request", self.topic)
    }

    /// Pattern the service side binds its request queue with. `#` matches
    /// zero or more trailing words, so it catches both fire-and-forget
    /// requests and qid-suffixed ones.
    pub fn request_binding_pattern(&self) -> String {
        format!("{}.request.#", self.topic)
    }

    pub fn response_routing_key(&self, qid: &str) -> String {
        format!("{}.response.{}", self.topic, qid)
    }

    /// Binding key for one reply consumer; single-use, only one queue can
    /// ever bind it for a given in-flight qid.
    pub fn reply_binding_key(&self, qid: &str) -> String {
        self.response_routing_key(qid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_the_convention() {
        let t = Topology::new("vivifacile", "backend", "python");
        assert_eq!(t.request_queue(), "backend_req");
        assert_eq!(t.request_routing_key(), "python.request");
        assert_eq!(t.request_binding_pattern(), "python.request.#");
        assert_eq!(t.reply_binding_key("q42"), "python.response.q42");
    }
}
