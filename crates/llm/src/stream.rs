/// Single-consumer sink for streamed generation chunks. A `Vec<String>`
/// works for tests; `agentrun-server` implements it over a bounded
/// WebSocket sender.
pub trait StreamSink: Send {
    fn push(&mut self, chunk: String);
}

impl StreamSink for Vec<String> {
    fn push(&mut self, chunk: String) {
        Vec::push(self, chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_collects_chunks() {
        let mut sink: Vec<String> = Vec::new();
        sink.push("a".to_string());
        sink.push("b".to_string());
        assert_eq!(sink, vec!["a".to_string(), "b".to_string()]);
    }
}
