//! Typed contract bindings, generated at compile time by `ethers::abigen!`
//! from the minimal ABI fragments the chain reader actually calls.

use ethers::prelude::abigen;

abigen!(
    PositionNft,
    r#"[
        function ownerOf(uint256 tokenId) external view returns (address)
        function balanceOf(address owner) external view returns (uint256)
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256)
        function positions(uint256 tokenId) external view returns (uint96 nonce, address operator, address token0, address token1, uint24 fee, int24 tickLower, int24 tickUpper, uint128 liquidity, uint256 feeGrowthInside0LastX128, uint256 feeGrowthInside1LastX128, uint128 tokensOwed0, uint128 tokensOwed1)
    ]"#
);

abigen!(
    LiquidityPool,
    r#"[
        function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked)
        function liquidity() external view returns (uint128)
    ]"#
);

abigen!(
    RewardTreasury,
    r#"[
        function userNonce(address user) external view returns (uint256)
        function userClaimedAmount(address user) external view returns (uint256)
        function isAuthorizedSigner(address signer) external view returns (bool)
        function claim(address user, uint256 cumulativeAuthorizedUnits, uint256 nonce, bytes signature) external
    ]"#
);

abigen!(
    RewardToken,
    r#"[
        function balanceOf(address owner) external view returns (uint256)
    ]"#
);
