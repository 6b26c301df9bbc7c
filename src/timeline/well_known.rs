//! Well-known labels and event classes.
//!
//! These guids are static hashes of fixed names, so the runtime and the
//! monitor agree on them without exchanging declarations first. They are
//! emitted once as the baseline right after the timeline message directory.

use std::sync::LazyLock;

use crate::guid::{static_guid, Guid};

pub static NAME_LABEL: LazyLock<Guid> = LazyLock::new(|| static_guid(NAME));
pub static TYPE_LABEL: LazyLock<Guid> = LazyLock::new(|| static_guid(TYPE));
pub static INDEX_LABEL: LazyLock<Guid> = LazyLock::new(|| static_guid(INDEX));
pub static BACKEND_ID_LABEL: LazyLock<Guid> = LazyLock::new(|| static_guid(BACKEND_ID));
pub static CONNECTION_LABEL: LazyLock<Guid> = LazyLock::new(|| static_guid(CONNECTION));

pub static START_OF_LIFE_CLASS: LazyLock<Guid> = LazyLock::new(|| static_guid(START_OF_LIFE));
pub static END_OF_LIFE_CLASS: LazyLock<Guid> = LazyLock::new(|| static_guid(END_OF_LIFE));

pub const NAME: &str = "name";
pub const TYPE: &str = "type";
pub const INDEX: &str = "index";
pub const BACKEND_ID: &str = "backendId";
pub const CONNECTION: &str = "connection";
pub const START_OF_LIFE: &str = "start_of_life";
pub const END_OF_LIFE: &str = "end_of_life";

/// The baseline label set, guid and text.
pub fn labels() -> [(Guid, &'static str); 7] {
    [
        (*NAME_LABEL, NAME),
        (*TYPE_LABEL, TYPE),
        (*INDEX_LABEL, INDEX),
        (*BACKEND_ID_LABEL, BACKEND_ID),
        (*CONNECTION_LABEL, CONNECTION),
        (*START_OF_LIFE_CLASS, START_OF_LIFE),
        (*END_OF_LIFE_CLASS, END_OF_LIFE),
    ]
}

/// The baseline event classes.
pub fn event_classes() -> [Guid; 2] {
    [*START_OF_LIFE_CLASS, *END_OF_LIFE_CLASS]
}
