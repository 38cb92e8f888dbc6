use cucumber::given;
use escrow_engine::test_utils::{
    fixtures::{seed_customer, seed_payee, seed_payout_account, seed_wallet},
    system::TestSystem,
};

use crate::cucumber::EscrowWorld;

#[given("a fresh install")]
async fn fresh_database(world: &mut EscrowWorld) {
    world.system = Some(TestSystem::new().await);
}

#[given(expr = "a customer '{word}' with customer id {word} and a default card")]
async fn customer(world: &mut EscrowWorld, user: String, customer_id: String) {
    seed_customer(&world.system().db, &user, &customer_id).await;
}

#[given(expr = "a payee '{word}' with connected account {word}")]
async fn payee(world: &mut EscrowWorld, user: String, connected: String) {
    seed_payee(&world.system().db, &user, &connected).await;
}

#[given(expr = "'{word}' can receive payouts at {word}")]
async fn payout_destination(world: &mut EscrowWorld, user: String, external_id: String) {
    seed_payout_account(&world.system().db, &user, &external_id, true).await;
}

#[given(expr = "'{word}' on connected account {word} has {int} cents available")]
async fn funds(world: &mut EscrowWorld, user: String, connected: String, amount: i64) {
    let sys = world.system();
    seed_wallet(&sys.db, &user, "usd", amount).await;
    sys.processor.set_balance(&connected, "usd", amount);
}
