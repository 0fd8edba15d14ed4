use crate::filters::{print_report, MessageFilter};
use crate::network::packet::Packet;

// 受信した全パケットを表示するフィルタ
pub struct PrintAllFilter {
    name: Option<String>,
}

impl PrintAllFilter {
    pub fn new() -> Self {
        Self { name: None }
    }
}

impl Default for PrintAllFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFilter for PrintAllFilter {
    fn code(&self) -> &'static str {
        "PRINT"
    }

    fn description(&self) -> &'static str {
        "受信した全パケットを表示します"
    }

    fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn process(&mut self, packet: &Packet) -> bool {
        let text = packet.to_string();
        print_report(self, &text);
        true
    }

    fn watch(&mut self) {}

    fn reset(&mut self) {}

    fn finish(&mut self) -> bool {
        true
    }

    fn duplicate(&self) -> Box<dyn MessageFilter> {
        let mut filter = PrintAllFilter::new();
        filter.name = self.name.clone();
        Box::new(filter)
    }
}
