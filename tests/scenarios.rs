//! End-to-end block scenarios over the in-memory store.
//!
//! Each scenario feeds hand-built blocks and logs through the processor's
//! apply path and asserts the materialized state, including the global
//! invariants (owner chains, supply bookkeeping, note mirroring).

use std::sync::Arc;

use ethscriptions_indexer::{
    codec, Block, BlockProcessor, Classifier, IndexStore, IndexerConfig, IndexerMetrics, Log,
    MemoryStore, RpcPool, TokenKind, Transaction, TransferKind,
};

struct Harness {
    store: Arc<MemoryStore>,
    processor: BlockProcessor<MemoryStore>,
}

impl Harness {
    async fn apply_block(
        &self,
        block: &Block,
        logs: &[Log],
    ) -> Result<(), ethscriptions_indexer::IndexerError> {
        self.processor.apply_block(block, logs).await
    }

    fn store(&self) -> &MemoryStore {
        &self.store
    }
}

fn processor() -> Harness {
    let config = IndexerConfig::development();
    let pool = Arc::new(RpcPool::new(&config.rpc).unwrap());
    let store = Arc::new(MemoryStore::new());
    Harness {
        store: store.clone(),
        processor: BlockProcessor::new(store, pool, config, Arc::new(IndexerMetrics::new())),
    }
}

fn create_tx(hash: &str, who: &str, uri: &str) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        from: who.to_string(),
        to: Some(who.to_string()),
        input: format!("0x{}", hex::encode(uri.as_bytes())),
    }
}

fn transfer_tx(hash: &str, from: &str, to: &str, ids: &[&str]) -> Transaction {
    let mut calldata = String::from("0x");
    for id in ids {
        calldata.push_str(id.trim_start_matches("0x"));
    }
    Transaction {
        hash: hash.to_string(),
        from: from.to_string(),
        to: Some(to.to_string()),
        input: calldata,
    }
}

fn block(number: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        number,
        timestamp: number * 12,
        transactions,
    }
}

fn esip3_create_log(contract: &str, initial_owner: &str, uri: &str, log_index: u64) -> Log {
    let owner = initial_owner.trim_start_matches("0x");
    let mut data = Vec::new();
    data.extend_from_slice(&[0u8; 24]);
    data.extend_from_slice(&32u64.to_be_bytes());
    data.extend_from_slice(&[0u8; 24]);
    data.extend_from_slice(&(uri.len() as u64).to_be_bytes());
    data.extend_from_slice(uri.as_bytes());
    while data.len() % 32 != 0 {
        data.push(0);
    }

    Log {
        address: contract.to_string(),
        topics: vec![
            Classifier::new().topics()[2].clone(),
            format!("0x{}{}", "0".repeat(64 - owner.len()), owner),
        ],
        data: format!("0x{}", hex::encode(&data)),
        tx_hash: format!("0xlogtx{}", log_index),
        log_index,
    }
}

const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const CAROL: &str = "0xcccccccccccccccccccccccccccccccccccccccc";
const EVE: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

#[tokio::test]
async fn s1_create_then_transfer() {
    let p = processor();
    let id = codec::sha256_hex(b"data:,hello");

    p.apply_block(&block(100, vec![create_tx("0xt1", ALICE, "data:,hello")]), &[])
        .await
        .unwrap();
    p.apply_block(&block(101, vec![transfer_tx("0xt2", ALICE, BOB, &[&id])]), &[])
        .await
        .unwrap();

    let store = p.store();
    let inscription = store.get_inscription(&id).await.unwrap().unwrap();
    assert_eq!(inscription.creator, ALICE);
    assert_eq!(inscription.current_owner, BOB);
    assert_eq!(inscription.creation_block, 100);

    let transfers = store.transfers_for(&id).await.unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].from, ALICE);
    assert_eq!(transfers[0].to, BOB);
    assert_eq!(transfers[0].block_number, 101);
    assert_eq!(transfers[0].kind, TransferKind::Eoa);
}

#[tokio::test]
async fn s2_transfer_with_wrong_owner_is_invisible() {
    let p = processor();
    let id = codec::sha256_hex(b"data:,hello");

    p.apply_block(&block(100, vec![create_tx("0xt1", ALICE, "data:,hello")]), &[])
        .await
        .unwrap();
    p.apply_block(&block(101, vec![transfer_tx("0xt2", ALICE, BOB, &[&id])]), &[])
        .await
        .unwrap();

    // Carol does not own the inscription.
    p.apply_block(&block(102, vec![transfer_tx("0xt3", CAROL, EVE, &[&id])]), &[])
        .await
        .unwrap();

    let store = p.store();
    let inscription = store.get_inscription(&id).await.unwrap().unwrap();
    assert_eq!(inscription.current_owner, BOB);
    assert_eq!(store.transfers_for(&id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn s3_esip6_siblings_sequence_from_one() {
    let p = processor();
    let plain = codec::sha256_hex(b"data:,foo");
    let opted = "data:,foo;rule=esip6";
    let opted_hash = codec::sha256_hex(opted.as_bytes());

    p.apply_block(&block(200, vec![create_tx("0xt1", ALICE, "data:,foo")]), &[])
        .await
        .unwrap();
    p.apply_block(&block(201, vec![create_tx("0xt2", ALICE, opted)]), &[])
        .await
        .unwrap();
    p.apply_block(&block(202, vec![create_tx("0xt3", ALICE, opted)]), &[])
        .await
        .unwrap();

    let store = p.store();
    assert!(store.get_inscription(&plain).await.unwrap().is_some());
    assert!(store
        .get_inscription(&format!("{}-1", opted_hash))
        .await
        .unwrap()
        .is_some());
    assert!(store
        .get_inscription(&format!("{}-2", opted_hash))
        .await
        .unwrap()
        .is_some());
    assert_eq!(store.stats().await.unwrap().inscriptions, 3);
}

#[tokio::test]
async fn s4_bulk_transfer_moves_both() {
    let p = processor();
    let id_one = codec::sha256_hex(b"data:,one");
    let id_two = codec::sha256_hex(b"data:,two");

    p.apply_block(
        &block(
            300,
            vec![
                create_tx("0xt1", ALICE, "data:,one"),
                create_tx("0xt2", ALICE, "data:,two"),
            ],
        ),
        &[],
    )
    .await
    .unwrap();

    p.apply_block(
        &block(301, vec![transfer_tx("0xt3", ALICE, EVE, &[&id_one, &id_two])]),
        &[],
    )
    .await
    .unwrap();

    let store = p.store();
    for id in [&id_one, &id_two] {
        let inscription = store.get_inscription(id).await.unwrap().unwrap();
        assert_eq!(inscription.current_owner, EVE);
        assert_eq!(store.transfers_for(id).await.unwrap().len(), 1);
    }
    assert_eq!(store.stats().await.unwrap().transfers, 2);
}

#[tokio::test]
async fn s5_fixed_denomination_lifecycle() {
    let p = processor();
    let deploy =
        r#"data:application/json,{"p":"erc-20-fixed-denomination","op":"deploy","tick":"bsct","max":"1000","lim":"100"}"#;
    // Mint payloads are identical, so they opt into ESIP-6 to stay
    // individually inscribable.
    let mint =
        r#"data:application/json;rule=esip6,{"p":"erc-20-fixed-denomination","op":"mint","tick":"bsct"}"#;

    p.apply_block(&block(400, vec![create_tx("0xd", ALICE, deploy)]), &[])
        .await
        .unwrap();
    for i in 0..10u64 {
        p.apply_block(
            &block(401 + i, vec![create_tx(&format!("0xm{}", i), ALICE, mint)]),
            &[],
        )
        .await
        .unwrap();
    }

    let store = p.store();
    let kind = TokenKind::FixedDenomination;
    let token = store.get_token(kind, "bsct").await.unwrap().unwrap();
    assert_eq!(token.minted, 1000);
    assert_eq!(store.token_note_count(kind, "bsct").await.unwrap(), 10);
    assert_eq!(store.sum_note_amounts(kind, "bsct").await.unwrap(), 1000);

    // An 11th mint is over max supply: the inscription exists, no note.
    p.apply_block(&block(420, vec![create_tx("0xm10", ALICE, mint)]), &[])
        .await
        .unwrap();
    let token = store.get_token(kind, "bsct").await.unwrap().unwrap();
    assert_eq!(token.minted, 1000);
    assert_eq!(store.token_note_count(kind, "bsct").await.unwrap(), 10);
}

#[tokio::test]
async fn s6_collection_lifecycle() {
    let p = processor();
    let create = r#"data:application/json,{"p":"erc-721-ethscriptions-collection","op":"create_collection_and_add_self","name":"Punks","symbol":"PNK","max_supply":"2","item":{"name":"punk #1"}}"#;
    let collection_id = codec::sha256_hex(create.as_bytes());

    p.apply_block(&block(500, vec![create_tx("0xc", ALICE, create)]), &[])
        .await
        .unwrap();

    let add = format!(
        r#"data:application/json,{{"p":"erc-721-ethscriptions-collection","op":"add_self_to_collection","collection_id":"{}","item":{{"name":"punk #2"}}}}"#,
        collection_id
    );
    p.apply_block(&block(501, vec![create_tx("0xa1", BOB, &add)]), &[])
        .await
        .unwrap();

    let store = p.store();
    assert_eq!(store.collection_item_count(&collection_id).await.unwrap(), 2);

    // Third add exceeds max_supply.
    let add_again = format!(
        r#"data:application/json,{{"p":"erc-721-ethscriptions-collection","op":"add","collection_id":"{}","item":{{"name":"punk #3"}}}}"#,
        collection_id
    );
    p.apply_block(&block(502, vec![create_tx("0xa2", CAROL, &add_again)]), &[])
        .await
        .unwrap();
    assert_eq!(store.collection_item_count(&collection_id).await.unwrap(), 2);

    // Lock, then edits are rejected.
    let lock = format!(
        r#"data:application/json,{{"p":"erc-721-ethscriptions-collection","op":"lock_collection","collection_id":"{}"}}"#,
        collection_id
    );
    p.apply_block(&block(503, vec![create_tx("0xl", ALICE, &lock)]), &[])
        .await
        .unwrap();
    assert!(store
        .get_collection(&collection_id)
        .await
        .unwrap()
        .unwrap()
        .locked);

    let edit = format!(
        r#"data:application/json,{{"p":"erc-721-ethscriptions-collection","op":"edit_collection","collection_id":"{}","name":"Renamed"}}"#,
        collection_id
    );
    p.apply_block(&block(504, vec![create_tx("0xe", ALICE, &edit)]), &[])
        .await
        .unwrap();
    assert_eq!(
        store.get_collection(&collection_id).await.unwrap().unwrap().name,
        "Punks"
    );
}

#[tokio::test]
async fn s7_contract_create() {
    let p = processor();
    let contract = "0xcafecafecafecafecafecafecafecafecafecafe";
    let id = codec::sha256_hex(b"data:,xyz");

    p.apply_block(
        &block(600, vec![]),
        &[esip3_create_log(contract, ALICE, "data:,xyz", 0)],
    )
    .await
    .unwrap();

    let store = p.store();
    let inscription = store.get_inscription(&id).await.unwrap().unwrap();
    assert!(inscription.created_by_contract);
    assert_eq!(inscription.creator_contract.as_deref(), Some(contract));
    assert_eq!(inscription.creator, contract);
    assert_eq!(inscription.current_owner, ALICE);
}

#[tokio::test]
async fn reprocessing_is_idempotent() {
    let p = processor();
    let id = codec::sha256_hex(b"data:,hello");
    let blocks = vec![
        block(100, vec![create_tx("0xt1", ALICE, "data:,hello")]),
        block(101, vec![transfer_tx("0xt2", ALICE, BOB, &[&id])]),
        block(
            102,
            vec![create_tx(
                "0xt3",
                ALICE,
                r#"data:application/json,{"p":"erc-20-fixed-denomination","op":"deploy","tick":"idem","max":"100","lim":"10"}"#,
            )],
        ),
    ];

    for b in &blocks {
        p.apply_block(b, &[]).await.unwrap();
    }
    let before = p.store().stats().await.unwrap();
    let owner_before = p
        .store()
        .get_inscription(&id)
        .await
        .unwrap()
        .unwrap()
        .current_owner;

    for b in &blocks {
        p.apply_block(b, &[]).await.unwrap();
    }
    let after = p.store().stats().await.unwrap();
    let owner_after = p
        .store()
        .get_inscription(&id)
        .await
        .unwrap()
        .unwrap()
        .current_owner;

    assert_eq!(before, after);
    assert_eq!(owner_before, owner_after);
}

#[tokio::test]
async fn token_note_owner_follows_inscription_owner() {
    let p = processor();
    let deploy =
        r#"data:application/json,{"p":"erc-20-fixed-denomination","op":"deploy","tick":"mirr","max":"100","lim":"10"}"#;
    let mint =
        r#"data:application/json,{"p":"erc-20-fixed-denomination","op":"mint","tick":"mirr"}"#;
    let mint_id = codec::sha256_hex(mint.as_bytes());

    p.apply_block(&block(700, vec![create_tx("0xd", ALICE, deploy)]), &[])
        .await
        .unwrap();
    p.apply_block(&block(701, vec![create_tx("0xm", ALICE, mint)]), &[])
        .await
        .unwrap();
    p.apply_block(&block(702, vec![transfer_tx("0xt", ALICE, BOB, &[&mint_id])]), &[])
        .await
        .unwrap();

    let store = p.store();
    let inscription = store.get_inscription(&mint_id).await.unwrap().unwrap();
    let backed = store.notes_backed_by(&mint_id).await.unwrap();
    assert_eq!(backed.len(), 1);
    assert_eq!(backed[0].1.owner, inscription.current_owner);
    assert_eq!(backed[0].1.owner, BOB);
    assert_eq!(
        store
            .sum_note_amounts(TokenKind::FixedDenomination, "mirr")
            .await
            .unwrap(),
        store
            .get_token(TokenKind::FixedDenomination, "mirr")
            .await
            .unwrap()
            .unwrap()
            .minted
    );
}
