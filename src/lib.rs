extern crate bidir_map;
extern crate indexmap;
#[macro_use]
extern crate itertools;
#[macro_use]
extern crate log;
#[macro_use]
extern crate ndarray;
extern crate rayon;

pub mod variable;
pub mod factor;
pub mod graph;
pub mod evidence;
pub mod init;
pub mod model;
pub mod triangulation;
pub mod schedule;
pub mod inference;
pub mod util;
pub use util::{Result, LauritzenError};
pub use variable::{all_assignments, Assignment, Variable};
pub use factor::{CombinationOp, Factor, ProjectionOp};
pub use init::Initialization;
pub use model::Model;
pub use model::directed::{DirectedModel, DirectedModelBuilder};
pub use evidence::EvidenceStore;
pub use inference::{ConditionalInferenceEngine, JunctionTreeEngine};
pub use inference::relevance::{BarrenPolicy, RelevanceStrategy};
