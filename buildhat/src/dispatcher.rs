//! The reader task.
//!
//! Lines are handled strictly one at a time: each is parsed, applied to the
//! registry under its lock, and then published, before the next line is
//! read. Nothing in here awaits while holding a lock.

use std::sync::{Arc, Weak};

use buildhat_core::protocol::event::{parse_line, Event};

use crate::hat::HatInner;
use crate::transport::LineReader;

pub(crate) async fn run(hat: Weak<HatInner>, mut reader: LineReader) {
    loop {
        let line = reader.next_line().await;
        let Some(inner) = hat.upgrade() else {
            return;
        };
        match line {
            Ok(line) => inner.dispatch_line(&line),
            Err(e) => {
                if !inner.is_shutting_down() {
                    log::warn!("Build HAT reader stopped: {}", e);
                }
                inner.transport_closed();
                return;
            }
        }
    }
}

impl HatInner {
    pub(crate) fn dispatch_line(self: &Arc<Self>, line: &str) {
        let Some(event) = parse_line(line) else {
            log::trace!("Ignoring {:?}", line);
            return;
        };
        if let Some(port) = event.port() {
            if event.is_detach() || matches!(event, Event::Connected { .. }) {
                self.reported.send_modify(|reported| *reported |= 1 << port.index());
            }
        }
        let publish = self.registry().apply(&event, &Arc::downgrade(self));
        if publish {
            // No receivers is fine
            let _ = self.events.send(event);
        }
    }

    pub(crate) fn transport_closed(&self) {
        self.closed.cancel();
        self.registry().close();
    }
}
