//! Domain services used by the HTTP and websocket routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the board table and notification semantics so route
//! handlers stay focused on request parsing and status mapping. Outbound
//! board traffic goes through `link` only.

pub mod dispatch;
pub mod events;
pub mod link;
pub mod liveness;
pub mod notifications;
pub mod registry;
