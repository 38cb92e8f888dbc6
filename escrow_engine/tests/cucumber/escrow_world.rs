use cucumber::World;
use escrow_engine::{
    db_types::{JobPayment, PaymentTransaction},
    test_utils::system::TestSystem,
    traits::AccountManagement,
    EscrowError,
    GateOutcome,
    SigningContext,
};

#[derive(Default, Debug, World)]
pub struct EscrowWorld {
    pub system: Option<TestSystem>,
    /// The body of the last webhook that was delivered, and the context it was signed for
    pub last_delivery: Option<(SigningContext, String)>,
    pub last_outcome: Option<Result<GateOutcome, EscrowError>>,
    pub last_error: Option<EscrowError>,
}

impl EscrowWorld {
    pub fn system(&self) -> &TestSystem {
        self.system.as_ref().expect("The engine has not been initialised")
    }

    pub async fn job(&self, job_id: &str) -> (JobPayment, PaymentTransaction) {
        let db = &self.system().db;
        let job = db.fetch_job_payment(job_id).await.expect("Error fetching job").expect("No such job");
        let txn = db
            .fetch_transaction(job.transaction_id)
            .await
            .expect("Error fetching transaction")
            .expect("Job has no transaction");
        (job, txn)
    }
}
