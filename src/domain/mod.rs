//! Order domain: aggregate, value objects and the events it raises
pub mod aggregates;
pub mod events;
pub mod value_objects;
