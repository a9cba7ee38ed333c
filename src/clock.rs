/// Monotonic event counter shared by every set of one controller.
///
/// Stamps start at 1 so a zero stamp always means "never touched".
#[derive(Debug, Default)]
pub struct Clock {
    now: u64,
}

impl Clock {
    pub fn new() -> Self {
        Clock { now: 0 }
    }

    pub fn tick(&mut self) -> u64 {
        self.now += 1;
        self.now
    }

    pub fn reset(&mut self) {
        self.now = 0;
    }
}
