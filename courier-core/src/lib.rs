//! Courier protocol reference implementation.
//! Host-driven: the library never dials sockets itself; the host supplies a
//! [`dispatch::Connector`] and drives the [`session::SessionController`] flows.

pub mod dispatch;
pub mod identity;
pub mod keys;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod wire;

pub use dispatch::{Connector, Dispatcher, ExchangeError, TransportError};
pub use identity::{LocalIdentity, PeerId, PeerName};
pub use keys::{KeyError, Keypair, SymmetricKey};
pub use protocol::{Request, ResponsePayload, CLIENT_VERSION};
pub use registry::{PeerRegistry, RegistryError};
pub use session::{MessageBody, PulledMessage, SessionController, SessionError, StateError};
pub use wire::ProtocolError;
