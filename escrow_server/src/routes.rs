//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate function. Keep this module neat and tidy 🙏
//!
//! Since each worker thread processes its requests sequentially, handlers must never block the current thread. All
//! ledger and processor work is async.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use escrow_engine::{traits::LedgerStore, SigningContext, WebhookDelivery, WebhookGate};
use log::*;

use crate::{data_objects::JsonResponse, errors::ServerError};

/// The processor signs every webhook body and sends the signature in this header
pub const SIGNATURE_HEADER: &str = "EPP-Signature";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(platform_webhook => Post "/webhook/platform" impl LedgerStore);
/// Events about the platform's own account: payment intents, payment methods and the platform balance.
pub async fn platform_webhook<B: LedgerStore>(
    req: HttpRequest,
    body: web::Bytes,
    gate: web::Data<WebhookGate<B>>,
) -> Result<HttpResponse, ServerError> {
    receive_webhook(&req, &body, gate.as_ref(), SigningContext::Platform).await
}

route!(connect_webhook => Post "/webhook/connect" impl LedgerStore);
/// Events about connected accounts: onboarding, external accounts, payouts and balances.
pub async fn connect_webhook<B: LedgerStore>(
    req: HttpRequest,
    body: web::Bytes,
    gate: web::Data<WebhookGate<B>>,
) -> Result<HttpResponse, ServerError> {
    receive_webhook(&req, &body, gate.as_ref(), SigningContext::Connect).await
}

/// Hands the raw body to the gate untouched; the signature covers the exact bytes that were sent.
///
/// Anything the gate accepts, even if it chose not to act on it, is acknowledged with a 200. Errors map to the status
/// codes in [`ServerError`], and the processor redelivers anything outside the 2xx range.
async fn receive_webhook<B: LedgerStore>(
    req: &HttpRequest,
    body: &[u8],
    gate: &WebhookGate<B>,
    context: SigningContext,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received {context} webhook ({} bytes)", body.len());
    let signature = req.headers().get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let delivery = WebhookDelivery::new(body, signature, context);
    match gate.handle(delivery).await {
        Ok(outcome) => {
            debug!("💻️ {context} webhook {outcome}");
            Ok(HttpResponse::Ok().json(JsonResponse::from(outcome)))
        },
        Err(e) => {
            warn!("💻️ {context} webhook rejected. {e}");
            Err(e.into())
        },
    }
}
