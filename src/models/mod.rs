pub mod audit;
pub mod constraints;
pub mod pasture;
pub mod plan;
pub mod timeline;

pub use audit::*;
pub use constraints::*;
pub use pasture::*;
pub use plan::*;
pub use timeline::*;
