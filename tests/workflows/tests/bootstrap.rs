use std::sync::Arc;

use loadgen_core::{
    Account, AccountId, InMemorySigner,
    accounts::AccountIdGenerator,
    proxy::ProxyError,
    rpc::{RpcError, mock::MockNode},
    scenario::{RunError, Runner, RunnerConfig},
    transaction::{CreateSubAccount, DeployContract, FunctionCall, FunctionCallAction, TGAS, near},
};
use loadgen_workflows::{
    Bootstrap, BootstrapConfig, BootstrapError, ContractPaths, FtTransferUser, SharedContext,
    WorkloadKind,
};
use serde_json::json;
use tests_workflows::{fake_contracts, funding_on, proxy};

fn id(value: &str) -> AccountId {
    AccountId::new(value).unwrap()
}

fn config(contracts: ContractPaths, run_id: &str) -> BootstrapConfig {
    BootstrapConfig {
        contracts,
        run_id: run_id.to_owned(),
        ..BootstrapConfig::default()
    }
}

#[tokio::test]
async fn funding_nonce_advances_once_per_transaction() {
    let node = Arc::new(MockNode::new());
    let mut funding = funding_on(&node, 5);
    let proxy = proxy(&node);
    proxy.refresh_nonce(&mut funding).await.unwrap();
    assert_eq!(funding.nonce(), 5);

    let sub_account = InMemorySigner::from_random(id("app.funding.test"));
    let create = CreateSubAccount {
        signer_id: funding.id().clone(),
        new_account_id: sub_account.account_id().clone(),
        public_key: sub_account.public_key(),
        balance: near(5),
    };
    let deploy = DeployContract {
        account_id: funding.id().clone(),
        code: Arc::from(&b"app"[..]),
        init: Vec::new(),
    };
    let init = FunctionCall::new(
        funding.id().clone(),
        funding.id().clone(),
        FunctionCallAction::json("init", &json!({}), 30 * TGAS, 0),
    );
    proxy.send_tx(&create, &mut funding).await.unwrap();
    proxy.send_tx(&deploy, &mut funding).await.unwrap();
    proxy.send_tx(&init, &mut funding).await.unwrap();

    assert_eq!(funding.nonce(), 8);
    let nonces: Vec<u64> = node
        .accepted()
        .iter()
        .map(|payload| payload.nonce())
        .collect();
    assert_eq!(nonces, vec![6, 7, 8]);
}

#[tokio::test]
async fn bootstrap_provisions_every_workload() {
    let node = Arc::new(MockNode::new());
    let funding = funding_on(&node, 5);
    let (_dir, contracts) = fake_contracts();

    let ctx = Bootstrap::new(proxy(&node), funding, config(contracts, "7"))
        .with_account_ids(AccountIdGenerator::from_seed(9))
        .run()
        .await
        .unwrap();

    let ft = ctx.ft().unwrap();
    let social = ctx.social().unwrap();
    let sweat = ctx.sweat().unwrap();
    assert_eq!(ft.id(), &id("ft7.funding.test"));
    assert_eq!(social.id(), &id("social7.funding.test"));
    assert_eq!(sweat.id(), &id("sweat7.funding.test"));
    assert_eq!(sweat.oracle().id(), &id("sweat7_oracle.funding.test"));
    for contract in [ft.id(), social.id(), sweat.id()] {
        assert!(node.has_contract(contract), "{contract} has no code");
    }

    assert_eq!(ctx.dependency_contracts().len(), 8);
    for target in ctx.dependency_contracts() {
        assert!(node.has_contract(target));
    }

    // ft, social, sweat, oracle and eight dependency accounts.
    assert_eq!(ctx.funding().lock().await.nonce(), 5 + 12);

    let init_ft = node.calls_to("new_default_meta");
    assert_eq!(init_ft.len(), 1);
    assert_eq!(init_ft[0].args["owner_id"], json!("ft7.funding.test"));

    let social_init: Vec<String> = node
        .calls()
        .into_iter()
        .filter(|call| &call.receiver_id == social.id())
        .map(|call| call.method_name)
        .collect();
    assert_eq!(social_init, vec!["new", "set_status"]);

    let sweat_init: Vec<String> = node
        .calls()
        .into_iter()
        .filter(|call| &call.receiver_id == sweat.id())
        .map(|call| call.method_name)
        .collect();
    assert_eq!(
        sweat_init,
        vec!["new", "add_oracle", "storage_deposit", "tge_mint"]
    );
}

#[tokio::test]
async fn second_run_reuses_existing_contracts() {
    let node = Arc::new(MockNode::new());
    let (_dir, contracts) = fake_contracts();
    let bootstrap_config = BootstrapConfig {
        workloads: [WorkloadKind::Ft, WorkloadKind::Sweat].into_iter().collect(),
        ..config(contracts, "1")
    };

    let first = Bootstrap::new(proxy(&node), funding_on(&node, 0), bootstrap_config.clone())
        .run()
        .await
        .unwrap();
    let first_nonce = first.funding().lock().await.nonce();

    let funding = Account::new(
        first.funding().lock().await.signer().clone(),
        0,
    );
    let second = Bootstrap::new(proxy(&node), funding, bootstrap_config)
        .run()
        .await
        .unwrap();

    assert_eq!(second.funding().lock().await.nonce(), first_nonce);
    assert_eq!(node.calls_to("new_default_meta").len(), 1);
    assert_eq!(node.calls_to("tge_mint").len(), 1);
    let ft = second.ft().unwrap();
    assert_eq!(
        ft.account().lock().await.nonce(),
        first.ft().unwrap().account().lock().await.nonce()
    );
}

fn ft_only(contracts: ContractPaths) -> BootstrapConfig {
    BootstrapConfig {
        workloads: [WorkloadKind::Ft].into_iter().collect(),
        ..config(contracts, "")
    }
}

#[tokio::test]
async fn leftover_account_without_code_gets_installed() {
    let node = Arc::new(MockNode::new());
    let (_dir, contracts) = fake_contracts();
    let leftover = InMemorySigner::from_seed(id("ft.funding.test"), "ft.funding.test");
    node.add_account(leftover.account_id().clone(), leftover.public_key(), 3);

    let ctx = Bootstrap::new(proxy(&node), funding_on(&node, 0), ft_only(contracts))
        .run()
        .await
        .unwrap();

    let ft = ctx.ft().unwrap();
    assert_eq!(ft.id(), &id("ft.funding.test"));
    assert!(node.has_contract(ft.id()));
    assert_eq!(node.calls_to("new_default_meta").len(), 1);
    assert_eq!(ft.account().lock().await.nonce(), 4);
    // The account was reused, so funding signed nothing.
    assert_eq!(ctx.funding().lock().await.nonce(), 0);
}

#[tokio::test]
async fn failed_init_leaves_no_code_for_the_next_run_to_trust() {
    let node = Arc::new(MockNode::new());
    let (_dir, contracts) = fake_contracts();
    let funding = funding_on(&node, 0);
    let signer = funding.signer().clone();
    node.fail_calls_to("new_default_meta");

    let err = Bootstrap::new(proxy(&node), funding, ft_only(contracts.clone()))
        .run()
        .await
        .err().unwrap();
    assert!(matches!(
        err,
        BootstrapError::Install {
            workload: WorkloadKind::Ft,
            ..
        }
    ));
    assert!(node.has_account(&id("ft.funding.test")));
    assert!(!node.has_contract(&id("ft.funding.test")));

    node.clear_call_failures();
    let ctx = Bootstrap::new(proxy(&node), Account::new(signer, 0), ft_only(contracts))
        .run()
        .await
        .unwrap();

    assert!(node.has_contract(ctx.ft().unwrap().id()));
    assert_eq!(node.calls_to("new_default_meta").len(), 1);
    assert_eq!(ctx.funding().lock().await.nonce(), 1);
}

#[tokio::test]
async fn missing_contract_code_fails_before_any_transaction() {
    let node = Arc::new(MockNode::new());
    let contracts = ContractPaths {
        ft: "/nonexistent/fungible_token.wasm".into(),
        ..ContractPaths::default()
    };
    let bootstrap_config = BootstrapConfig {
        workloads: [WorkloadKind::Ft].into_iter().collect(),
        ..config(contracts, "")
    };

    let err = Bootstrap::new(proxy(&node), funding_on(&node, 0), bootstrap_config)
        .run()
        .await
        .err().unwrap();

    assert!(matches!(
        err,
        BootstrapError::Code {
            workload: WorkloadKind::Ft,
            ..
        }
    ));
    assert!(node.sent().is_empty());
}

#[tokio::test]
async fn bootstrap_failure_stops_users_before_registration() {
    let node = Arc::new(MockNode::new());
    let (_dir, contracts) = fake_contracts();
    node.fail_next_sends([RpcError::InvalidTransaction(
        "NotEnoughBalance".to_owned(),
    )]);
    let bootstrap_config = BootstrapConfig {
        workloads: [WorkloadKind::Ft].into_iter().collect(),
        ..config(contracts, "")
    };

    let mut runner = Runner::<SharedContext>::new(RunnerConfig {
        spawn_rate: 0.0,
        ..RunnerConfig::default()
    });
    runner
        .spawn_users::<FtTransferUser>(3, &Default::default())
        .unwrap();
    let result = runner
        .run(Bootstrap::new(proxy(&node), funding_on(&node, 0), bootstrap_config).run())
        .await;

    let Err(RunError::Bootstrap(err)) = result else {
        panic!("bootstrap failure must abort the run");
    };
    let err = err.downcast::<BootstrapError>().unwrap();
    assert!(matches!(*err, BootstrapError::Accounts(ProxyError::Submission(_))));
    assert_eq!(node.sent().len(), 1);
    assert!(!node.has_account(&id("ft.funding.test")));
}
