//! Interrupt handler chaining
//!
//! Each interrupt line keeps a stack of registered handlers. An event is offered to the
//! most recently installed handler first; a handler that does not own the event returns
//! [`Dispatch::Forward`] and the event moves on to the handler installed before it. This
//! is the classic save-previous / call-previous chain, but registrations are removed by
//! token, so a session tearing down out of order can never unhook somebody else's handler.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Interrupt sources the streaming core registers for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptLine {
    /// A hardware timer reached its match value; the resource number is the timer id
    TimerMatch,
}

/// What a handler did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The handler consumed the event
    Handled,
    /// The event belongs to someone else; offer it to the previous handler
    Forward,
}

/// Handler callback: receives the resource number that raised the interrupt
pub type Handler = Arc<dyn Fn(u32) -> Dispatch + Send + Sync>;

/// Registration returned by [`InterruptTable::install`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerToken {
    line: InterruptLine,
    id: u64,
}

struct Registration {
    id: u64,
    handler: Handler,
}

/// Per-line handler stacks
#[derive(Default)]
pub struct InterruptTable {
    lines: RwLock<HashMap<InterruptLine, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for InterruptTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lines = self.lines.read();
        let depths: HashMap<_, _> = lines.iter().map(|(line, regs)| (*line, regs.len())).collect();
        f.debug_struct("InterruptTable")
            .field("depths", &depths)
            .finish()
    }
}

impl InterruptTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `handler` on top of `line`'s chain
    pub fn install(&self, line: InterruptLine, handler: Handler) -> HandlerToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lines
            .write()
            .entry(line)
            .or_default()
            .push(Registration { id, handler });
        HandlerToken { line, id }
    }

    /// Remove a registration. Handlers above and below it keep their order.
    ///
    /// Returns false if the token was already removed.
    pub fn remove(&self, token: HandlerToken) -> bool {
        let mut lines = self.lines.write();
        let Some(chain) = lines.get_mut(&token.line) else {
            return false;
        };
        let Some(pos) = chain.iter().position(|reg| reg.id == token.id) else {
            return false;
        };
        chain.remove(pos);
        if chain.is_empty() {
            lines.remove(&token.line);
        }
        true
    }

    /// Offer an event to `line`'s handlers, newest first
    ///
    /// Returns [`Dispatch::Forward`] if no handler claimed it.
    pub fn dispatch(&self, line: InterruptLine, resource: u32) -> Dispatch {
        let lines = self.lines.read();
        if let Some(chain) = lines.get(&line) {
            for reg in chain.iter().rev() {
                if (reg.handler)(resource) == Dispatch::Handled {
                    return Dispatch::Handled;
                }
            }
        }
        Dispatch::Forward
    }

    /// Number of handlers installed on `line`
    pub fn depth(&self, line: InterruptLine) -> usize {
        self.lines.read().get(&line).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(owner: u32, name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Handler {
        let log = Arc::clone(log);
        Arc::new(move |resource: u32| {
            if resource == owner {
                log.lock().push(name);
                Dispatch::Handled
            } else {
                Dispatch::Forward
            }
        })
    }

    #[test]
    fn test_forward_reaches_previous_handler() {
        let table = InterruptTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        table.install(InterruptLine::TimerMatch, recorder(0, "first", &log));
        table.install(InterruptLine::TimerMatch, recorder(1, "second", &log));

        assert_eq!(table.dispatch(InterruptLine::TimerMatch, 0), Dispatch::Handled);
        assert_eq!(table.dispatch(InterruptLine::TimerMatch, 1), Dispatch::Handled);
        assert_eq!(table.dispatch(InterruptLine::TimerMatch, 2), Dispatch::Forward);
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_out_of_order_removal_keeps_other_handlers() {
        let table = InterruptTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = table.install(InterruptLine::TimerMatch, recorder(0, "a", &log));
        let b = table.install(InterruptLine::TimerMatch, recorder(1, "b", &log));
        let c = table.install(InterruptLine::TimerMatch, recorder(2, "c", &log));

        assert!(table.remove(b));
        assert!(!table.remove(b));
        assert_eq!(table.depth(InterruptLine::TimerMatch), 2);

        table.dispatch(InterruptLine::TimerMatch, 0);
        table.dispatch(InterruptLine::TimerMatch, 1);
        table.dispatch(InterruptLine::TimerMatch, 2);
        assert_eq!(*log.lock(), vec!["a", "c"]);

        assert!(table.remove(a));
        assert!(table.remove(c));
        assert_eq!(table.depth(InterruptLine::TimerMatch), 0);
    }

    #[test]
    fn test_newest_handler_wins() {
        let table = InterruptTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        table.install(InterruptLine::TimerMatch, recorder(5, "old", &log));
        let top = table.install(InterruptLine::TimerMatch, recorder(5, "new", &log));

        table.dispatch(InterruptLine::TimerMatch, 5);
        table.remove(top);
        table.dispatch(InterruptLine::TimerMatch, 5);
        assert_eq!(*log.lock(), vec!["new", "old"]);
    }
}
