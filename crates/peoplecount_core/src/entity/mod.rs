//! Documents, field patches and client views.

mod id;
mod model;
mod patch;
mod view;

pub use id::EntityId;
pub use model::{Camera, Document, Entity, Store, User, VerbatimCredential};
pub use patch::{FieldValue, Patch};
pub use view::{CameraView, DocumentView, StoreView, UserView};
