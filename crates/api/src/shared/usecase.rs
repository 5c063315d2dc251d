use std::fmt::Debug;

use futures::future::join_all;
use scheduling_infra::AppContext;
use tracing::debug;

/// A side effect to a `UseCase`: acts upon the response of a successful
/// execution. Used by e.g. the booking use cases to fan out notification
/// and webhook jobs without the core transition logic knowing about queues.
#[async_trait::async_trait]
pub trait Subscriber<U: UseCase>: Send + Sync {
    async fn notify(&self, e: &U::Response, ctx: &AppContext);
}

#[async_trait::async_trait]
pub trait UseCase: Debug + Send {
    type Response: Debug + Send;
    type Error: Send;

    /// UseCase name identifier, used in tracing spans.
    const NAME: &'static str;

    async fn execute(&mut self, ctx: &AppContext) -> Result<Self::Response, Self::Error>;

    fn subscribers() -> Vec<Box<dyn Subscriber<Self>>>
    where
        Self: Sized,
    {
        Default::default()
    }
}

#[tracing::instrument(name = "UseCase executed", skip(usecase, ctx), fields(usecase = %U::NAME))]
pub async fn execute<U>(usecase: U, ctx: &AppContext) -> Result<U::Response, U::Error>
where
    U: UseCase + Send,
    U::Error: Debug + Send,
{
    let mut usecase = usecase;
    debug!("{:?}", usecase);
    let res = usecase.execute(ctx).await;

    match &res {
        Ok(res) => {
            let subscribers = U::subscribers();
            let mut subscriber_promises = Vec::with_capacity(subscribers.len());
            for subscriber in &subscribers {
                subscriber_promises.push(subscriber.notify(res, ctx));
            }
            join_all(subscriber_promises).await;
        }
        Err(e) => {
            debug!("Error: {:?}", e);
        }
    }

    res
}
