//! Contract bindings for the pool factory and the pools it deploys.
//!
//! Minimal surface: just the views, events and the one write the agent
//! needs. Enumeration is paginated (`poolCount` + `getPools`) so startup
//! cost stays bounded as the factory grows.

use alloy::sol;

sol! {
    #[sol(rpc)]
    contract SusuFactory {
        event PoolCreated(address indexed pool, address indexed creator);

        function poolCount() external view returns (uint256 count);
        function getPools(uint256 offset, uint256 limit) external view returns (address[] memory page);
    }

    #[sol(rpc)]
    contract SusuPool {
        event MemberJoined(address indexed member);
        event ContributionMade(address indexed member, uint256 amount, uint256 round);
        event PayoutDistributed(address indexed recipient, uint256 amount, uint256 round);

        function getPoolInfo() external view returns (
            uint256 contributionAmount,
            uint256 cycleDuration,
            uint256 currentRound,
            uint256 nextPayoutTime,
            bool isActive,
            address token
        );
        function maxMembers() external view returns (uint256 count);
        function getMembers() external view returns (address[] memory members);
        function getMemberStatus(address member) external view returns (
            bool contributedThisRound,
            uint256 totalContributed,
            bool receivedPayout
        );
        function distributePot() external;
    }
}
