mod common;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;

use common::{recipient, spender, token_contract, wallet_address, ScriptedRpc};
use dapp_bridge_core::chain_registry::default_chains;
use dapp_bridge_core::domain::{FeeData, TransactionPayload, DEFAULT_GAS_LIMIT};
use dapp_bridge_core::enrichment::{decode_approve, EnrichError, IERC20, APPROVE_SELECTOR};
use dapp_bridge_core::nonce::NonceSequencer;
use dapp_bridge_core::{ChainConfig, Classification, TransactionEnricher};

fn mainnet() -> ChainConfig {
    default_chains().remove(0)
}

fn transfer() -> TransactionPayload {
    TransactionPayload {
        from: Some(wallet_address()),
        to: Some(recipient()),
        value: Some(U256::from(0x2540be400u64)),
        ..TransactionPayload::default()
    }
}

fn approve_data(amount: U256) -> Bytes {
    Bytes::from(
        IERC20::approveCall {
            spender: spender(),
            amount,
        }
        .abi_encode(),
    )
}

#[test]
fn enrich_fills_gas_and_fees_and_attaches_chain() {
    let rpc = ScriptedRpc::default();
    let chain = mainnet();
    let tx = TransactionEnricher::default().enrich(&rpc, transfer(), &chain);

    assert_eq!(tx.gas, Some(21_000));
    assert_eq!(tx.gas_price, Some(U256::from(0x4a817c800u64)));
    assert_eq!(tx.max_fee_per_gas, None);
    assert_eq!(tx.chain_config.as_ref(), Some(&chain));
}

#[test]
fn enrich_degrades_when_rpc_fails() {
    let rpc = ScriptedRpc::failing();
    let tx = TransactionEnricher::default().enrich(&rpc, transfer(), &mainnet());

    assert_eq!(tx.gas, Some(DEFAULT_GAS_LIMIT));
    assert_eq!(tx.gas_price, None);
    assert_eq!(tx.max_fee_per_gas, None);
    assert_eq!(tx.max_priority_fee_per_gas, None);
    assert!(tx.chain_config.is_some());
}

#[test]
fn enrich_respects_page_supplied_fields() {
    let rpc = ScriptedRpc {
        fees: Some(FeeData {
            gas_price: Some(U256::from(1u64)),
            ..FeeData::default()
        }),
        ..ScriptedRpc::default()
    };
    let tx = TransactionPayload {
        gas: Some(90_000),
        max_fee_per_gas: Some(U256::from(50u64)),
        max_priority_fee_per_gas: Some(U256::from(2u64)),
        ..transfer()
    };
    let out = TransactionEnricher::default().enrich(&rpc, tx, &mainnet());

    assert_eq!(out.gas, Some(90_000));
    assert_eq!(out.max_fee_per_gas, Some(U256::from(50u64)));
    assert_eq!(out.gas_price, None);
    assert!(rpc.gas_requests.lock().expect("gas requests").is_empty());
}

#[test]
fn custom_default_gas_limit_is_used_on_failure() {
    let rpc = ScriptedRpc::failing();
    let tx = TransactionEnricher::new(60_000).enrich(&rpc, transfer(), &mainnet());
    assert_eq!(tx.gas, Some(60_000));
}

#[test]
fn approve_call_data_classifies_as_token_approval() {
    let rpc = ScriptedRpc::default().with_token("WCRO", 18, U256::from(7u64));
    let enricher = TransactionEnricher::default();

    for amount in [U256::ZERO, U256::from(1u64), U256::from(10u64).pow(U256::from(24u64)), U256::MAX] {
        let data = approve_data(amount);
        assert_eq!(data[..4], APPROVE_SELECTOR);
        let tx = TransactionPayload {
            to: Some(token_contract()),
            data: Some(data.clone()),
            ..transfer()
        };

        let approval = match enricher.classify(&rpc, tx, &mainnet()).expect("classify") {
            Classification::TokenApproval(approval) => approval,
            other => panic!("expected token approval, got {other:?}"),
        };

        // Manual ABI layout: selector | pad(12) address(20) | uint256(32)
        let manual_spender = Address::from_slice(&data[16..36]);
        let manual_amount = U256::from_be_slice(&data[36..68]);
        assert_eq!(approval.spender, manual_spender);
        assert_eq!(approval.amount, manual_amount);
        assert_eq!(approval.amount, amount);
        assert_eq!(approval.token_data.contract, token_contract());
        assert_eq!(approval.token_data.symbol, "WCRO");
        assert_eq!(approval.token_data.decimals, 18);
        assert_eq!(approval.token_data.total_supply, U256::from(7u64));
    }
}

#[test]
fn empty_data_is_a_transfer_and_other_data_a_contract_call() {
    let rpc = ScriptedRpc::default();
    let enricher = TransactionEnricher::default();

    let plain = enricher
        .classify(&rpc, transfer(), &mainnet())
        .expect("classify transfer");
    assert!(matches!(plain, Classification::Transfer(_)));

    let call = TransactionPayload {
        data: Some(Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb, 0x00])),
        ..transfer()
    };
    let classified = enricher
        .classify(&rpc, call, &mainnet())
        .expect("classify call");
    assert!(matches!(classified, Classification::ContractCall(_)));
}

#[test]
fn truncated_approve_data_fails_to_decode() {
    let mut data = approve_data(U256::from(1u64)).to_vec();
    data.truncate(40);
    let err = decode_approve(&data).expect_err("truncated");
    assert!(matches!(err, EnrichError::Decode(_)));

    let rpc = ScriptedRpc::default().with_token("WCRO", 18, U256::from(7u64));
    let tx = TransactionPayload {
        to: Some(token_contract()),
        data: Some(Bytes::from(data)),
        ..transfer()
    };
    let err = TransactionEnricher::default()
        .classify(&rpc, tx, &mainnet())
        .expect_err("classification fails");
    assert!(matches!(err, EnrichError::Decode(_)));
}

#[test]
fn missing_token_metadata_is_an_error() {
    let rpc = ScriptedRpc::default();
    let tx = TransactionPayload {
        to: Some(token_contract()),
        data: Some(approve_data(U256::from(1u64))),
        ..transfer()
    };
    let err = TransactionEnricher::default()
        .classify(&rpc, tx, &mainnet())
        .expect_err("metadata unavailable");
    assert!(matches!(err, EnrichError::TokenMetadata(_)));
}

#[test]
fn nonces_increase_while_rpc_count_lags() {
    let rpc = ScriptedRpc::default();
    rpc.set_tx_count(5);
    let chain = mainnet();
    let nonces = NonceSequencer::new();

    let a = nonces.reserve(&rpc, &chain, wallet_address()).expect("first");
    let b = nonces.reserve(&rpc, &chain, wallet_address()).expect("second");
    let c = nonces.reserve(&rpc, &chain, wallet_address()).expect("third");
    assert_eq!((a, b, c), (5, 6, 7));

    rpc.set_tx_count(20);
    let d = nonces.reserve(&rpc, &chain, wallet_address()).expect("rpc ahead");
    assert_eq!(d, 20);

    let other = nonces.reserve(&rpc, &chain, recipient()).expect("other address");
    assert_eq!(other, 20);
}

#[test]
fn released_nonce_is_handed_out_again_only_if_last() {
    let rpc = ScriptedRpc::default();
    let chain = mainnet();
    let nonces = NonceSequencer::new();

    let a = nonces.reserve(&rpc, &chain, wallet_address()).expect("a");
    nonces
        .release(chain.chain_id, wallet_address(), a)
        .expect("release a");
    assert_eq!(nonces.reserve(&rpc, &chain, wallet_address()).expect("a again"), a);

    let b = nonces.reserve(&rpc, &chain, wallet_address()).expect("b");
    nonces
        .release(chain.chain_id, wallet_address(), a)
        .expect("stale release");
    assert_eq!(nonces.reserve(&rpc, &chain, wallet_address()).expect("c"), b + 1);
}

#[test]
fn pinned_nonce_is_not_replaced() {
    let rpc = ScriptedRpc::default();
    rpc.set_tx_count(3);
    let enricher = TransactionEnricher::default();
    let mut tx = TransactionPayload {
        nonce: Some(42),
        ..transfer()
    };
    let reserved = enricher
        .assign_nonce(&rpc, &mut tx, &mainnet())
        .expect("assign");
    assert_eq!(reserved, None);
    assert_eq!(tx.nonce, Some(42));

    let mut fresh = transfer();
    let reserved = enricher
        .assign_nonce(&rpc, &mut fresh, &mainnet())
        .expect("assign");
    assert_eq!(reserved, Some(3));
    assert_eq!(fresh.nonce, Some(3));
}
