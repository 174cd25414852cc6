pub use color_eyre::eyre::{bail, eyre, Context, ContextCompat, OptionExt, WrapErr};
pub use color_eyre::{Result, Section};
pub use itertools::Itertools;
pub use std::collections::HashSet;
pub use std::path::{Path, PathBuf};
