use anyhow::Context as _;
use async_trait::async_trait;
use serenity::{builder::CreateMessage, http::Http, model::id::ChannelId};
use std::sync::Arc;

use crate::audio::{MessageRef, Notice, Notifier};
use crate::ui::embeds;

/// Posts session notices to text channels.
pub struct SerenityNotifier {
    http: Arc<Http>,
}

impl SerenityNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for SerenityNotifier {
    async fn notify(&self, channel_id: ChannelId, notice: Notice) -> anyhow::Result<MessageRef> {
        let message = channel_id
            .send_message(self.http.as_ref(), CreateMessage::new().embed(embeds::notice_embed(&notice)))
            .await
            .with_context(|| format!("No se pudo enviar mensaje a {}", channel_id))?;

        Ok(MessageRef {
            channel_id,
            message_id: message.id,
        })
    }

    async fn delete(&self, message: MessageRef) -> anyhow::Result<()> {
        message
            .channel_id
            .delete_message(self.http.as_ref(), message.message_id)
            .await
            .context("No se pudo borrar el anuncio")?;
        Ok(())
    }
}
