//! # Penumbra Surface
//!
//! Sampled fields and optical-surface data for the Penumbra workspace:
//!
//! - **Scalar fields** ([`field`]): 1D and 2D grids with range-checked
//!   linear/bilinear interpolation, slicing, marginals and resampling.
//! - **Figure errors** ([`profile`]): height-error profiles and surface maps
//!   in mirror coordinates.
//! - **Displacements** ([`displacement`]): element rotations and offsets
//!   folded into an effective height field.
//! - **File parsers** ([`parsers`]): import profiles and surface maps from
//!   plain-text files.

pub mod displacement;
pub mod field;
pub mod parsers;
pub mod profile;

pub use displacement::{DisplacedProfile, DisplacedSurface, Displacement, ProfileFolding};
pub use field::{linspace, FieldError, ScalarField1D, ScalarField2D};
pub use parsers::{load_figure_error, FigureErrorFormat, ParseError};
pub use profile::{FigureErrorProfile, SurfaceAxis};
