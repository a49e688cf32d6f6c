mod bindings;
mod reader;

pub use bindings::{LiquidityPool, PositionNft, RewardToken, RewardTreasury};
pub use reader::{ChainReader, OnChainPosition, PoolState};
