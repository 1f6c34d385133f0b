//! One module per subcommand.

pub mod check;
pub mod heal;
pub mod list;
pub mod reposition;
