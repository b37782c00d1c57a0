//! Request-key resolution and response shaping for the finmock fixture server.

pub mod context;
pub mod gateway;
pub mod key;
pub mod pipeline;
pub mod response;
pub mod shape;

pub use context::RequestContext;
pub use gateway::{FixtureGateway, GatewayError, MemoryFixtures};
pub use key::{QueryVariant, ResolvedKey};
pub use pipeline::{Resolution, resolve, resolve_and_shape};
pub use response::{ErrorBody, MockResponse, Outcome};
pub use shape::{PaginationRequest, RecordKind, ShapeError, shape};
