use std::{convert::Infallible, sync::Arc};

use teloxide::{dispatching::Dispatcher as TgDispatcher, dptree, prelude::*, types::BotCommand as TgCommand};

use n8nbot_core::{
    command::BotCommand, config::Config, dispatcher::Dispatcher, domain::ChatId,
    formatting::code,
};

use crate::handlers;

/// Long-poll Telegram until shutdown, handing every message to `dispatcher`.
pub async fn run_polling(cfg: Arc<Config>, bot: Bot, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "n8nbot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed"),
    }
    tracing::info!(
        container = %cfg.n8n_container,
        domain = %cfg.n8n_domain,
        policy = ?cfg.unauthorized_policy,
        "managing n8n"
    );

    let commands: Vec<TgCommand> = BotCommand::menu()
        .iter()
        .map(|(name, description)| TgCommand::new(*name, *description))
        .collect();
    if let Err(e) = bot.set_my_commands(commands).await {
        tracing::warn!(error = %e, "failed to register command menu");
    }

    send_startup_notice(&cfg, &dispatcher).await;

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    TgDispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher])
        .distribution_function(no_distribution_key)
        .build()
        .dispatch()
        .await;

    tracing::info!("polling stopped");
    Ok(())
}

/// Without a key every update gets its own task, so `/status` is answered while
/// a long `/backup` or `/update` from the same chat is still running.
fn no_distribution_key(_: &Update) -> Option<Infallible> {
    None
}

/// Best-effort "bot is up" message to the operator.
async fn send_startup_notice(cfg: &Config, dispatcher: &Dispatcher) {
    let Ok(operator) = cfg.operator_id.trim().parse::<i64>() else {
        tracing::warn!("operator id is not a numeric chat id; skipping startup notice");
        return;
    };
    let html = format!(
        "🤖 n8n bot is online for {}. Send /start for commands.",
        code(&cfg.n8n_domain)
    );
    if let Err(e) = dispatcher.messenger().send_html(ChatId(operator), &html).await {
        tracing::warn!(error = %e, "startup notice failed");
    }
}
