mod points;
mod weight;

pub use points::{PointsCommit, PoolPoints, UserPoints};
pub use weight::{PoolWeight, PoolWeightView};
