pub mod registry;
pub mod response;

pub use registry::{EndpointRegistry, Handler, HandlerFuture};
pub use response::CommandResponse;
