//! Protocol phase tracking shared by the client and server roles.

use crate::types::{
    is_initialized, ClientCapabilities, Implementation, McpError, McpResult, ServerCapabilities,
};

/// Lifecycle phase of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Initializing => "initializing",
            Phase::Ready => "ready",
            Phase::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// A message as seen by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    Request(&'a str),
    Response,
    Notification(&'a str),
}

/// What the peer declared during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerCapabilities {
    Client(ClientCapabilities),
    Server(ServerCapabilities),
}

/// Per-endpoint session record.
#[derive(Debug, Clone)]
pub struct Session {
    role: Role,
    phase: Phase,
    protocol_version: Option<String>,
    peer_info: Option<Implementation>,
    peer_capabilities: Option<PeerCapabilities>,
}

impl Session {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            phase: Phase::Uninitialized,
            protocol_version: None,
            peer_info: None,
            peer_capabilities: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    pub fn peer_info(&self) -> Option<&Implementation> {
        self.peer_info.as_ref()
    }

    pub fn peer_capabilities(&self) -> Option<&PeerCapabilities> {
        self.peer_capabilities.as_ref()
    }

    /// Record the outcome of `initialize`. Only meaningful while initializing.
    pub fn record_negotiation(
        &mut self,
        protocol_version: String,
        peer_info: Option<Implementation>,
        peer_capabilities: PeerCapabilities,
    ) {
        self.protocol_version = Some(protocol_version);
        self.peer_info = peer_info;
        self.peer_capabilities = Some(peer_capabilities);
    }

    pub fn close(&mut self) {
        if self.phase != Phase::Closed {
            tracing::debug!(role = ?self.role, from = %self.phase, "Session closed");
        }
        self.phase = Phase::Closed;
    }

    /// Check `event` against the transition table and apply it.
    ///
    /// On rejection the phase is left unchanged.
    pub fn apply(&mut self, direction: Direction, event: Event<'_>) -> McpResult<Phase> {
        let next = transition(self.role, self.phase, direction, event)?;
        if next != self.phase {
            tracing::debug!(role = ?self.role, from = %self.phase, to = %next, "Session phase changed");
            self.phase = next;
        }
        Ok(next)
    }

    /// Check `event` without applying it.
    pub fn check(&self, direction: Direction, event: Event<'_>) -> McpResult<()> {
        transition(self.role, self.phase, direction, event).map(|_| ())
    }
}

/// The transition table. Returns the phase after `event`, or the error for an
/// out-of-phase event.
pub fn transition(
    role: Role,
    phase: Phase,
    direction: Direction,
    event: Event<'_>,
) -> McpResult<Phase> {
    use Direction::*;
    use Event::*;
    use Phase::*;
    use Role::*;

    if phase == Closed {
        return Err(McpError::SessionClosed);
    }

    // Liveness checks are valid in every open phase.
    if matches!(event, Request("ping")) {
        return Ok(phase);
    }

    let next = match (phase, role, direction, event) {
        (Ready, _, _, _) => Some(Ready),

        (Uninitialized, Server, Incoming, Request("initialize")) => Some(Initializing),
        (Uninitialized, Client, Outgoing, Request("initialize")) => Some(Initializing),

        (Initializing, Client, Incoming, Response) => Some(Initializing),
        (Initializing, Client, Outgoing, Notification(m)) if is_initialized(m) => Some(Ready),
        (Initializing, Server, Outgoing, Response) => Some(Initializing),
        (Initializing, Server, Incoming, Notification(m)) if is_initialized(m) => Some(Ready),

        _ => None,
    };

    next.ok_or_else(|| {
        let what = match event {
            Request(m) => format!("request '{m}'"),
            Response => "response".to_string(),
            Notification(m) => format!("notification '{m}'"),
        };
        let dir = match direction {
            Incoming => "received",
            Outgoing => "sent",
        };
        McpError::ProtocolViolation(format!("{what} {dir} while session is {phase}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_handshake_path() {
        let mut s = Session::new(Role::Client);
        assert_eq!(
            s.apply(Direction::Outgoing, Event::Request("initialize")).unwrap(),
            Phase::Initializing
        );
        assert_eq!(
            s.apply(Direction::Incoming, Event::Response).unwrap(),
            Phase::Initializing
        );
        assert_eq!(
            s.apply(Direction::Outgoing, Event::Notification("initialized"))
                .unwrap(),
            Phase::Ready
        );
        assert!(s.is_ready());
        assert!(s.check(Direction::Outgoing, Event::Request("tools/call")).is_ok());
    }

    #[test]
    fn test_server_handshake_path_accepts_alias() {
        let mut s = Session::new(Role::Server);
        s.apply(Direction::Incoming, Event::Request("initialize")).unwrap();
        s.apply(Direction::Outgoing, Event::Response).unwrap();
        s.apply(
            Direction::Incoming,
            Event::Notification("notifications/initialized"),
        )
        .unwrap();
        assert_eq!(s.phase(), Phase::Ready);
    }

    #[test]
    fn test_out_of_phase_events_are_violations() {
        let s = Session::new(Role::Client);
        let err = s
            .check(Direction::Outgoing, Event::Request("tools/call"))
            .unwrap_err();
        assert!(matches!(err, McpError::ProtocolViolation(_)));

        // A server never sends initialize; a client never receives it.
        let server = Session::new(Role::Server);
        assert!(server
            .check(Direction::Outgoing, Event::Request("initialize"))
            .is_err());
        assert!(Session::new(Role::Client)
            .check(Direction::Incoming, Event::Request("initialize"))
            .is_err());

        let mut init = Session::new(Role::Server);
        init.apply(Direction::Incoming, Event::Request("initialize"))
            .unwrap();
        let err = init
            .apply(Direction::Incoming, Event::Request("tools/call"))
            .unwrap_err();
        assert!(matches!(err, McpError::ProtocolViolation(_)));
        assert_eq!(init.phase(), Phase::Initializing);
    }

    #[test]
    fn test_handshake_sides_are_fixed_by_role() {
        let mut server = Session::new(Role::Server);
        assert!(matches!(
            server.apply(Direction::Outgoing, Event::Request("initialize")),
            Err(McpError::ProtocolViolation(_))
        ));
        assert_eq!(server.phase(), Phase::Uninitialized);

        server
            .apply(Direction::Incoming, Event::Request("initialize"))
            .unwrap();
        // Only the client announces `initialized`.
        assert!(server
            .apply(Direction::Outgoing, Event::Notification("initialized"))
            .is_err());
        assert!(server.apply(Direction::Incoming, Event::Response).is_err());
        assert_eq!(server.phase(), Phase::Initializing);

        let mut client = Session::new(Role::Client);
        assert!(client
            .apply(Direction::Incoming, Event::Request("initialize"))
            .is_err());
        client
            .apply(Direction::Outgoing, Event::Request("initialize"))
            .unwrap();
        assert!(client
            .apply(Direction::Incoming, Event::Notification("initialized"))
            .is_err());
        assert!(client.apply(Direction::Outgoing, Event::Response).is_err());
        assert_eq!(client.phase(), Phase::Initializing);
    }

    #[test]
    fn test_ping_allowed_before_ready() {
        let s = Session::new(Role::Server);
        assert_eq!(
            transition(
                Role::Server,
                Phase::Uninitialized,
                Direction::Incoming,
                Event::Request("ping")
            )
            .unwrap(),
            Phase::Uninitialized
        );
        assert!(s.check(Direction::Incoming, Event::Request("ping")).is_ok());
    }

    #[test]
    fn test_closed_rejects_everything() {
        let mut s = Session::new(Role::Client);
        s.close();
        for event in [
            Event::Request("ping"),
            Event::Response,
            Event::Notification("initialized"),
        ] {
            assert!(matches!(
                s.check(Direction::Incoming, event),
                Err(McpError::SessionClosed)
            ));
            assert!(matches!(
                s.check(Direction::Outgoing, event),
                Err(McpError::SessionClosed)
            ));
        }
    }
}
