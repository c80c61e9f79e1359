//! LiquidLong contract interface.

use alloy::sol;

sol! {
    /// Position record returned by `getCdps`
    #[derive(Debug, PartialEq, Eq)]
    struct CDP {
        uint256 id;
        uint256 debtInAttodai;
        uint256 lockedAttoeth;
        address owner;
        bool userOwned;
    }

    /// LiquidLong contract interface (client subset)
    #[derive(Debug, PartialEq, Eq)]
    interface ILiquidLong {
        event NewCup(address user, uint256 cup);
        event CloseCup(address user, uint256 cup);

        /// ETH/USD price, 18 decimals
        function ethPriceInUsd() external view returns (uint256 attousd);

        /// Fee charged per ETH borrowed, 18 decimals
        function providerFeePerEth() external view returns (uint256 attoethPerEth);

        /// Simulate selling `attodaiToSell` DAI for WETH against the order book
        function estimateDaiSaleProceeds(uint256 attodaiToSell)
            external
            view
            returns (uint256 daiPaid, uint256 wethBought);

        /// Page through positions held by `owner`
        function getCdps(address owner, uint256 offset, uint256 pageSize)
            external
            view
            returns (CDP[] cdps);

        function openCdp(
            uint256 leverage,
            uint256 leverageSizeInAttoeth,
            uint256 allowedFeeInAttoeth,
            address affiliateAddress
        ) external payable returns (uint256 cupId);

        function closeCdp(
            uint256 cupId,
            uint256 minimumValueInAttoeth,
            address affiliateAddress
        ) external returns (uint256 payoutInAttoeth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use alloy::sol_types::{SolCall, SolEvent};

    #[test]
    fn test_signatures() {
        assert_eq!(ILiquidLong::ethPriceInUsdCall::SIGNATURE, "ethPriceInUsd()");
        assert_eq!(
            ILiquidLong::getCdpsCall::SIGNATURE,
            "getCdps(address,uint256,uint256)"
        );
        assert_eq!(
            ILiquidLong::openCdpCall::SIGNATURE,
            "openCdp(uint256,uint256,uint256,address)"
        );
        assert_eq!(ILiquidLong::NewCup::SIGNATURE, "NewCup(address,uint256)");
        assert_eq!(ILiquidLong::CloseCup::SIGNATURE, "CloseCup(address,uint256)");
    }

    #[test]
    fn test_selectors_match_deployed_abi() {
        assert_eq!(hex::encode(ILiquidLong::ethPriceInUsdCall::SELECTOR), "683e0bcd");
        assert_eq!(hex::encode(ILiquidLong::providerFeePerEthCall::SELECTOR), "fa72c53e");
        assert_eq!(
            hex::encode(ILiquidLong::estimateDaiSaleProceedsCall::SELECTOR),
            "5988899c"
        );
        assert_eq!(hex::encode(ILiquidLong::getCdpsCall::SELECTOR), "07babd94");
        assert_eq!(hex::encode(ILiquidLong::openCdpCall::SELECTOR), "2b1841d2");
        assert_eq!(hex::encode(ILiquidLong::closeCdpCall::SELECTOR), "4d334878");
        assert_eq!(
            hex::encode(ILiquidLong::NewCup::SIGNATURE_HASH),
            "709cc16ea8511075a3ab24379309dae1e82ebaf34c6cc6d7d0f2ef45edcc47c8"
        );
        assert_eq!(
            hex::encode(ILiquidLong::CloseCup::SIGNATURE_HASH),
            "39e480d689fcbdc80e2b153195653c5ab8cebdc906b0b9a4aeb2a8d1e7fedd3d"
        );
    }

    #[test]
    fn test_get_cdps_encoding_length() {
        let call = ILiquidLong::getCdpsCall {
            owner: Address::ZERO,
            offset: U256::ZERO,
            pageSize: U256::from(1000u64),
        };
        // selector + three static words
        assert_eq!(call.abi_encode().len(), 4 + 32 * 3);
    }

    #[test]
    fn test_estimate_returns_roundtrip() {
        let returns = ILiquidLong::estimateDaiSaleProceedsCall::abi_encode_returns(&(
            U256::from(100u64),
            U256::from(9u64),
        ));
        let decoded =
            ILiquidLong::estimateDaiSaleProceedsCall::abi_decode_returns(&returns, true).unwrap();
        assert_eq!(decoded.daiPaid, U256::from(100u64));
        assert_eq!(decoded.wethBought, U256::from(9u64));
    }
}
