pub mod binary_sb;
pub mod db_object;
pub mod frames;
pub mod sbtoc;
pub mod shared;

use anyhow::Result;

pub trait FileParser {
    type Output;

    fn parse(&self, bytes: &[u8]) -> Result<Self::Output>;
}
