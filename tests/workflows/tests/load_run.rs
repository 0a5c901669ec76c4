use std::{collections::BTreeMap, sync::Arc, time::Duration};

use loadgen_core::{AccountId, rpc::mock::MockNode};
use loadgen_runner::{LoadConfig, config::WaitBetweenConfig, run_with_node};
use loadgen_workflows::WorkloadKind;
use serde_json::json;
use tests_workflows::{fake_contracts, funding_on, proxy};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ft_users_transfer_between_registered_peers() {
    let node = Arc::new(MockNode::new());
    let funding = funding_on(&node, 0);
    let (_dir, contracts) = fake_contracts();
    let config = LoadConfig {
        users: 4,
        spawn_rate: 0.0,
        run_duration: Duration::from_millis(500),
        stop_grace: Duration::from_secs(2),
        wait_between: WaitBetweenConfig {
            min: Duration::from_millis(5),
            max: Duration::from_millis(10),
        },
        workloads: BTreeMap::from([(WorkloadKind::Ft, 1)]),
        contracts,
        run_id: "load".to_owned(),
        ..LoadConfig::default()
    };

    let summary = run_with_node(&config, proxy(&node), funding).await.unwrap();

    assert_eq!(summary.spawned, 4);
    assert_eq!(summary.registered, 4);
    assert_eq!(summary.abandoned, 0);
    assert!(summary.tasks_succeeded > 0);
    assert_eq!(summary.tasks_failed, 0);

    let contract = AccountId::new("ftload.funding.test").unwrap();
    let user_transfers: Vec<_> = node
        .calls_to("ft_transfer")
        .into_iter()
        .filter(|call| call.signer_id != contract)
        .collect();
    assert!(!user_transfers.is_empty());
    for call in user_transfers {
        assert_ne!(call.args["receiver_id"], json!(call.signer_id.as_str()));
        assert_eq!(call.args["amount"], json!("1"));
    }
    assert_eq!(node.calls_to("storage_deposit").len(), 4);
}
