//! Definitions of Solidity functions called during deployment and configuration

use alloy_sol_types::sol;

sol! {
    /// The governance and upgrade surface of a vault pool
    #[allow(missing_docs)]
    interface IPool {
        function governor() external view returns (address);
        function keepers() external view returns (address[] memory);
        function maintainers() external view returns (address[] memory);
        function addKeeper(address keeper) external;
        function addMaintainer(address maintainer) external;
        function upgradeToAndCall(address newImplementation, bytes memory data) external payable;
    }

    /// The `MultiSendCallOnly` batching entrypoint
    #[allow(missing_docs)]
    function multiSend(bytes memory transactions) external payable;

    /// The EIP-712 struct a Safe owner or delegate signs
    #[allow(missing_docs, non_snake_case)]
    struct SafeTx {
        address to;
        uint256 value;
        bytes data;
        uint8 operation;
        uint256 safeTxGas;
        uint256 baseGas;
        uint256 gasPrice;
        address gasToken;
        address refundReceiver;
        uint256 nonce;
    }
}
