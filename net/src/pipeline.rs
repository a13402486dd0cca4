/// The payload of a `message` event (§4.5).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Message {
    Text(String),
    Bytes(Vec<u8>),
}

/// One event traveling through the plugin stack (§4.5).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Event {
    Opened,
    Message(Message),
    Close { reason: String, terminate: bool },
    Closed { reason: String, origin: String },
}

/// A pure transformer in the connection pipeline: `transformIncoming` runs
/// outermost-first on events arriving from the socket, `transformOutgoing`
/// runs innermost-first on events heading to the socket. Returning `None`
/// swallows the event. Plugins may also produce events of their own
/// (timers, sentinel frames) via [`Plugin::poll_injected`] (§4.5).
pub trait Plugin: Send {
    fn transform_incoming(&mut self, evt: Event) -> Option<Event>;
    fn transform_outgoing(&mut self, evt: Event) -> Option<Event>;

    /// Events this plugin wants to inject into the pipeline independent of
    /// any event it just transformed (e.g. a keepalive pulse). Drained by
    /// the connection's driver loop, not by `transform_*` callers.
    fn poll_injected(&mut self) -> Vec<Event> {
        Vec::new()
    }
}

/// The ordered plugin stack of a [`Connection`]; index 0 is outermost
/// (closest to the socket), last is innermost (closest to the application)
/// (§4.5 "Standard stack (outer -> inner): socket, statistics,
/// fragmentation, keepalive, ping/pong, encryption, promise/queue helper").
pub struct Pipeline {
    plugins: Vec<Box<dyn Plugin>>,
}

impl Pipeline {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    /// Runs an incoming event outermost -> innermost; any plugin may
    /// swallow it.
    pub fn dispatch_incoming(&mut self, evt: Event) -> Option<Event> {
        let mut current = Some(evt);
        for plugin in self.plugins.iter_mut() {
            current = match current {
                Some(e) => plugin.transform_incoming(e),
                None => return None,
            };
        }
        current
    }

    /// Runs an outgoing event innermost -> outermost.
    pub fn dispatch_outgoing(&mut self, evt: Event) -> Option<Event> {
        let mut current = Some(evt);
        for plugin in self.plugins.iter_mut().rev() {
            current = match current {
                Some(e) => plugin.transform_outgoing(e),
                None => return None,
            };
        }
        current
    }

    pub fn poll_injected(&mut self) -> Vec<Event> {
        self.plugins.iter_mut().flat_map(|p| p.poll_injected()).collect()
    }

    pub fn plugin_mut(&mut self, index: usize) -> Option<&mut Box<dyn Plugin>> {
        self.plugins.get_mut(index)
    }
}
