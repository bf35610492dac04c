//! Headless engine for API-driven forms
//!
//! Pipeline:
//! - `resolver`: static field spec + server schema + live value -> `FieldDefinition`
//! - `coercion`: wire value <-> in-memory value per field type
//! - `dispatch`: `FieldDefinition` -> widget descriptor
//! - `lookup`: debounced, paginated, cancellable related-model search
//! - `submission` / `error_map`: payload serialization and 400 mapping
//! - `session`: one open form instance tying the above together
//!
//! UI layers render `BoundWidget`s and route edits back through `FormSession`.

pub mod config;
pub mod coercion;
pub mod definition;
pub mod dependent;
pub mod dispatch;
pub mod error;
pub mod error_map;
#[cfg(not(target_arch = "wasm32"))]
pub mod http;
pub mod lookup;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod state;
pub mod submission;
pub mod timer;
pub mod transport;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{load_config, FormEngineConfig};
pub use coercion::Coercer;
pub use definition::{
    ErrorDisplay, FieldDefinition, FieldKind, FieldSlot, FieldSpec, Filters, Hook, RelatedModelRef,
};
pub use dispatch::{dispatch, BoundWidget, Widget};
pub use error::{FormError, TransportError};
pub use lookup::{LookupUpdate, RelatedModelCacheEntry, RelatedModelLookup};
pub use registry::{init_model_registry, model_registry, ModelRegistry};
pub use session::FormSession;
pub use state::{FormState, ValidationErrorSet};
pub use submission::{LinkedTable, Navigator, Notifier, SubmitHooks, SubmitOutcome, SubmitTarget};
pub use timer::Sleeper;
pub use transport::{ApiRequest, ApiResponse, ApiTransport, Method, MultipartPart, RequestBody};
pub use value::{FieldValue, FileHandle, FileValue};
