pub mod list;
pub mod promote;
