/// Kernel layer: typed properties, validation, progress and cancellation.
///
/// ```text
///   "Params" = "0,10,100"
///        │  set_property_value
///        ▼
///   ┌──────────┐   parse by kind    ┌───────────────┐
///   │ Property  │ ─────────────────▶ │ PropertyValue  │
///   └──────────┘                    └───────────────┘
///        │  validator (on every set)
///        ▼
///   ┌─────────────────┐
///   │ PropertyManager  │  validate_all() before execute
///   └─────────────────┘
/// ```

pub mod progress;
pub mod property;
pub mod property_manager;
pub mod validators;
