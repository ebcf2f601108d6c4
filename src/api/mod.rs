/// Algorithm API: the contract concrete algorithms implement and the engine
/// that runs them.
///
/// ```text
///   Framework ──create_algorithm(name, version)──▶ AlgorithmFactory
///       │                                              │
///       │ ads / config                                 ▼
///       │                                       Box<dyn Algorithm>
///       ▼                                              │
///   AlgorithmRunner  ◀─────────────────────────────────┘
///       │  resolve inputs → validate → exec(ctx) → history → publish
///       ▼
///   ExecutionContext ── create_child_algorithm ──▶ AlgorithmRunner (child)
///       │
///       └── for_each_spectrum / map_spectra (rayon)
/// ```

pub mod algorithm;
pub mod async_exec;
pub mod factory;
pub mod framework;
pub mod parallel;
