//! End-to-end menu flows
//!
//! Drives the shipped menu definition and flag table through the session
//! pipeline with in-memory storage and a canned account service.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use ussd_core::{Backends, FlagTable, IndexedListStore, KeyedStore, SessionPipeline, SimpleStorageProvider, UserDataStore};
use ussd_handlers::{AccountCreated, AccountService, Balance, Handlers, VoucherHolding};
use ussd_menu::{MenuDefinition, MenuEngine};

const SENDER: &str = "254711000001";
const RECEIVER: &str = "254711000002";

/// Hands out sequential public keys; every account holds 100 SRF
#[derive(Default)]
struct CannedAccounts {
    created: AtomicUsize,
}

#[async_trait]
impl AccountService for CannedAccounts {
    async fn create_account(&self) -> ussd_handlers::Result<AccountCreated> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccountCreated {
            tracking_id: format!("track-{}", n),
            public_key: format!("0x{:040x}", n),
            custodial_id: n.to_string(),
        })
    }

    async fn check_balance(&self, _public_key: &str) -> ussd_handlers::Result<Balance> {
        Ok(Balance {
            balance: "0.003 CELO".to_string(),
            nonce: "0".to_string(),
        })
    }

    async fn track_account_status(&self, _public_key: &str) -> ussd_handlers::Result<bool> {
        Ok(true)
    }

    async fn fetch_vouchers(&self, _public_key: &str) -> ussd_handlers::Result<Vec<VoucherHolding>> {
        Ok(vec![
            VoucherHolding {
                contract_address: "0xd4c288865ce0985a481eef3be02443dc5e409faf".to_string(),
                token_symbol: "SRF".to_string(),
                token_decimals: "6".to_string(),
                balance: "100".to_string(),
            },
            VoucherHolding {
                contract_address: "0x45d747172e77d55575c197cba9451bc2cd8f4958".to_string(),
                token_symbol: "MILO".to_string(),
                token_decimals: "6".to_string(),
                balance: "20".to_string(),
            },
        ])
    }
}

fn resource(path: &str) -> String {
    format!("{}/{}", env!("CARGO_MANIFEST_DIR"), path)
}

fn pipeline() -> SessionPipeline {
    let flags = FlagTable::from_path(resource("config/flags.csv")).unwrap();
    let menu = MenuDefinition::from_path(resource("menus/main.toml")).unwrap();
    let backends = Backends::memory();

    let store: Arc<dyn UserDataStore> = Arc::new(KeyedStore::new(backends.userdata.clone()));
    let lists = IndexedListStore::new(backends.userdata.clone());
    let handlers = Handlers::with_flag_table(store, lists, Arc::new(CannedAccounts::default()), &flags).unwrap();
    let engine = MenuEngine::new(menu, &flags, Arc::new(handlers)).unwrap();

    let provider = Arc::new(SimpleStorageProvider::new(backends.state, backends.userdata, None));
    SessionPipeline::new(provider, Arc::new(engine)).with_markers("CON ", "END ")
}

async fn reply(pipeline: &SessionPipeline, session_id: &str, input: &str) -> String {
    let mut screen = Vec::new();
    pipeline.run(session_id, input.as_bytes(), &mut screen).await.unwrap();
    String::from_utf8(screen).unwrap()
}

/// English registration with PIN 1234, ending on the main menu
async fn register(pipeline: &SessionPipeline, session_id: &str) {
    assert!(reply(pipeline, session_id, "").await.starts_with("CON Welcome to Sarafu Network"));
    assert!(reply(pipeline, session_id, "1").await.starts_with("CON Do you agree"));
    assert!(reply(pipeline, session_id, "0").await.starts_with("CON Please enter a new four number PIN"));
    assert!(reply(pipeline, session_id, "1234").await.starts_with("CON Enter your four number PIN again"));
    assert!(reply(pipeline, session_id, "1234").await.starts_with("CON Your PIN has been set"));
    assert!(reply(pipeline, session_id, "0").await.starts_with("CON Balance: 100 SRF\n1:Send"));
}

#[tokio::test]
async fn test_registration_lands_on_main_menu() {
    let pipeline = pipeline();
    register(&pipeline, SENDER).await;

    // A new dial skips registration
    assert_eq!(
        reply(&pipeline, SENDER, "").await,
        "CON Balance: 100 SRF\n1:Send\n2:My Vouchers\n3:My Account\n4:Help\n9:Quit"
    );
}

#[tokio::test]
async fn test_send_to_registered_phone() {
    let pipeline = pipeline();
    register(&pipeline, RECEIVER).await;
    register(&pipeline, SENDER).await;

    assert!(reply(&pipeline, SENDER, "1").await.starts_with("CON Enter recipient's phone number"));
    assert_eq!(reply(&pipeline, SENDER, "0711000002").await, "CON Balance: 100 SRF\nEnter amount:\n0:Back");
    assert_eq!(
        reply(&pipeline, SENDER, "50").await,
        "CON 254711000002 will receive 50 SRF from 254711000001\nPlease enter your PIN to confirm:"
    );
    assert_eq!(
        reply(&pipeline, SENDER, "1234").await,
        "END Your request has been sent. 254711000002 will receive 50 SRF from 254711000001."
    );
}

#[tokio::test]
async fn test_unregistered_recipient_offers_retry() {
    let pipeline = pipeline();
    register(&pipeline, SENDER).await;

    reply(&pipeline, SENDER, "1").await;
    assert_eq!(
        reply(&pipeline, SENDER, "0799999999").await,
        "CON 0799999999 is not registered, please try again:\n1:Retry\n9:Quit"
    );
    assert!(reply(&pipeline, SENDER, "1").await.starts_with("CON Enter recipient's phone number"));
    assert!(reply(&pipeline, SENDER, "0").await.starts_with("CON Balance: 100 SRF\n1:Send"));
}

#[tokio::test]
async fn test_amount_over_balance_is_rejected() {
    let pipeline = pipeline();
    register(&pipeline, SENDER).await;

    reply(&pipeline, SENDER, "1").await;
    reply(&pipeline, SENDER, "0x45d747172e77d55575c197cba9451bc2cd8f4958").await;
    assert_eq!(
        reply(&pipeline, SENDER, "500").await,
        "CON Amount 500 is invalid, please try again:\n1:Retry\n9:Quit"
    );
    assert_eq!(reply(&pipeline, SENDER, "1").await, "CON Balance: 100 SRF\nEnter amount:\n0:Back");
}

#[tokio::test]
async fn test_wrong_transaction_pin() {
    let pipeline = pipeline();
    register(&pipeline, SENDER).await;

    reply(&pipeline, SENDER, "1").await;
    reply(&pipeline, SENDER, "0x45d747172e77d55575c197cba9451bc2cd8f4958").await;
    reply(&pipeline, SENDER, "10").await;
    assert_eq!(reply(&pipeline, SENDER, "9999").await, "CON Incorrect PIN\n1:Retry\n9:Quit");
    assert_eq!(reply(&pipeline, SENDER, "9").await, "END Thank you for using Sarafu. Goodbye!");
}

#[tokio::test]
async fn test_pin_mismatch_on_registration() {
    let pipeline = pipeline();

    reply(&pipeline, SENDER, "").await;
    reply(&pipeline, SENDER, "1").await;
    reply(&pipeline, SENDER, "0").await;
    assert_eq!(
        reply(&pipeline, SENDER, "12").await,
        "CON The PIN you entered is invalid. The PIN must be a 4 digit number.\n1:Retry\n9:Quit"
    );
    assert!(reply(&pipeline, SENDER, "1").await.starts_with("CON Please enter a new four number PIN"));
    reply(&pipeline, SENDER, "1234").await;
    assert!(reply(&pipeline, SENDER, "4321").await.starts_with("CON The PIN is not a match"));
}

#[tokio::test]
async fn test_swahili_registration() {
    let pipeline = pipeline();

    reply(&pipeline, SENDER, "").await;
    assert!(reply(&pipeline, SENDER, "2").await.starts_with("CON Kwa kutumia huduma hii"));
    assert!(reply(&pipeline, SENDER, "1").await.starts_with("END Asante kwa kutumia huduma ya Sarafu"));
}

#[tokio::test]
async fn test_select_voucher() {
    let pipeline = pipeline();
    register(&pipeline, SENDER).await;

    assert_eq!(
        reply(&pipeline, SENDER, "2").await,
        "CON Select number or symbol from your vouchers:\n1:SRF\n2:MILO\n0:Back"
    );
    assert_eq!(reply(&pipeline, SENDER, "MILO").await, "CON Enter PIN to confirm selection:");
    assert_eq!(
        reply(&pipeline, SENDER, "1234").await,
        "CON Success! MILO is now your active voucher.\n0:Back\n9:Quit"
    );
    assert!(reply(&pipeline, SENDER, "0").await.starts_with("CON Balance: 20 MILO\n1:Send"));
}

#[tokio::test]
async fn test_voucher_survives_redisplay() {
    let pipeline = pipeline();
    register(&pipeline, SENDER).await;

    reply(&pipeline, SENDER, "2").await;
    assert_eq!(reply(&pipeline, SENDER, "2").await, "CON Enter PIN to confirm selection:");
    reply(&pipeline, SENDER, "1234").await;

    // An unknown key redisplays the confirmation
    assert_eq!(
        reply(&pipeline, SENDER, "5").await,
        "CON Success! MILO is now your active voucher.\n0:Back\n9:Quit"
    );
    assert!(reply(&pipeline, SENDER, "0").await.starts_with("CON Balance: 20 MILO\n1:Send"));
}
