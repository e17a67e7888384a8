use ais_receiver::Receiver;

use crate::config::ChannelLayout;

/// Receiver slots. `a` always exists after startup; `b` only for `both`.
#[derive(Default)]
pub struct Receivers {
    pub a: Option<Receiver>,
    pub b: Option<Receiver>,
}

impl Receivers {
    pub fn iter(&self) -> impl Iterator<Item = &Receiver> {
        self.a.iter().chain(self.b.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_none() && self.b.is_none()
    }

    /// Destroy both receivers. Returns false if there was nothing to destroy.
    pub fn clear(&mut self) -> bool {
        let had = !self.is_empty();
        // A before B
        self.a = None;
        self.b = None;
        had
    }
}

/// Routes each filled buffer to the receivers the layout calls for.
///
/// Channel selection itself happens inside each receiver (it was built
/// with the layout's interleave and its own offset); the dispatcher only
/// decides who runs and in which order.
#[derive(Debug, Clone, Copy)]
pub struct ChannelDispatcher {
    layout: ChannelLayout,
}

impl ChannelDispatcher {
    pub fn new(layout: ChannelLayout) -> Self {
        Self { layout }
    }

    /// Run the receivers over `frames` frames. Returns how many ran.
    pub fn dispatch(&self, receivers: &mut Receivers, samples: &[i16], frames: usize) -> usize {
        let mut ran = 0;
        if let Some(ref mut a) = receivers.a {
            a.run(samples, frames);
            ran += 1;
        }
        if self.layout == ChannelLayout::Both {
            if let Some(ref mut b) = receivers.b {
                b.run(samples, frames);
                ran += 1;
            }
        }
        ran
    }
}
