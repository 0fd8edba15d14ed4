use crate::filters::MessageFilter;
use crate::network::packet::Packet;

// 何もしないフィルタ。最小のフィルタ実装
pub struct EmptyFilter {
    name: Option<String>,
}

impl EmptyFilter {
    pub fn new() -> Self {
        Self { name: None }
    }
}

impl Default for EmptyFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFilter for EmptyFilter {
    fn code(&self) -> &'static str {
        "EMPTY"
    }

    fn description(&self) -> &'static str {
        "パケットを静かに処理します"
    }

    fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn process(&mut self, _packet: &Packet) -> bool {
        true
    }

    fn watch(&mut self) {}

    fn reset(&mut self) {}

    fn finish(&mut self) -> bool {
        true
    }

    fn duplicate(&self) -> Box<dyn MessageFilter> {
        let mut filter = EmptyFilter::new();
        filter.name = self.name.clone();
        Box::new(filter)
    }
}
