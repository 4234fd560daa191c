use std::sync::Arc;

use n8nbot_core::{
    config::Config, dispatcher::Dispatcher, messaging::MessagingPort, ports::ProcessRunner,
};
use n8nbot_process::TokioProcessRunner;
use n8nbot_telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> Result<(), n8nbot_core::Error> {
    n8nbot_core::logging::init("n8nbot")?;

    let cfg = match Config::load() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            tracing::error!(error = %e, "startup aborted");
            return Err(e);
        }
    };

    let telegram = TelegramMessenger::from_token(&cfg.telegram_bot_token);
    let bot = telegram.bot();
    let messenger: Arc<dyn MessagingPort> = Arc::new(telegram);
    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner::new());
    let dispatcher = Arc::new(Dispatcher::new(cfg.clone(), runner, messenger));

    n8nbot_telegram::router::run_polling(cfg, bot, dispatcher)
        .await
        .map_err(|e| n8nbot_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
