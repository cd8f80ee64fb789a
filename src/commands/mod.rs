pub mod bundles;
pub mod cat;
pub mod chunks;
pub mod dump;
pub mod list;
pub mod toc;
