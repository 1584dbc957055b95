use serde::Serialize;

use multireact_core::ReactionList;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String, emoji: bool },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into(), emoji: true }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::PlainText { text, .. } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { text: TextObject },
    Section { block_id: String, text: TextObject },
    Image { image_url: String, alt_text: String },
    Divider,
    Context { block_id: String, elements: Vec<TextObject> },
}

/// Ephemeral command response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

/// A Block Kit surface: a modal opened from a trigger or the App Home tab.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum View {
    Modal { title: TextObject, close: TextObject, blocks: Vec<Block> },
    Home { blocks: Vec<Block> },
}

impl View {
    pub fn blocks(&self) -> &[Block] {
        match self {
            Self::Modal { blocks, .. } | Self::Home { blocks } => blocks,
        }
    }
}

#[derive(Default)]
pub struct BlocksBuilder {
    blocks: Vec<Block>,
}

impl BlocksBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Header { text: TextObject::plain(text) });
        self
    }

    pub fn section(mut self, block_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = TextObject::mrkdwn(text);
        self.blocks.push(Block::Section { block_id: block_id.into(), text });
        self
    }

    /// Screenshots only render when the public app URL is known.
    pub fn images(mut self, app_url: Option<&str>, images: &[(&str, &str)]) -> Self {
        let Some(app_url) = app_url else {
            return self;
        };
        let app_url = app_url.trim_end_matches('/');
        for (file, alt_text) in images {
            self.blocks.push(Block::Image {
                image_url: format!("{app_url}/img/{file}?w=1024&ssl=1"),
                alt_text: (*alt_text).to_owned(),
            });
        }
        self
    }

    pub fn divider(mut self) -> Self {
        self.blocks.push(Block::Divider);
        self
    }

    pub fn context(mut self, block_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Context {
            block_id: block_id.into(),
            elements: vec![TextObject::plain(text)],
        });
        self
    }

    pub fn message(self, fallback_text: impl Into<String>) -> MessageTemplate {
        MessageTemplate { fallback_text: fallback_text.into(), blocks: self.blocks }
    }

    pub fn build(self) -> Vec<Block> {
        self.blocks
    }
}

fn text_message(block_id: &str, text: String) -> MessageTemplate {
    BlocksBuilder::new().section(block_id, text.clone()).message(text)
}

pub fn current_reactions_message(list: &ReactionList, slash_command: &str) -> MessageTemplate {
    text_message(
        "multireact.command.current.v1",
        format!(
            "Your current reactions are: {}. Type `{slash_command} <new list of emojis>` to \
             change them.",
            list.to_display()
        ),
    )
}

pub fn no_reactions_message(slash_command: &str) -> MessageTemplate {
    text_message(
        "multireact.command.none.v1",
        format!(
            "You do not have any reactions set :anguished:\nType `{slash_command} <list of \
             emojis>` to set one."
        ),
    )
}

pub fn too_many_reactions_message() -> MessageTemplate {
    text_message(
        "multireact.command.too_many.v1",
        "Slow down! You tried to save more than 23 reactions :racing_car:\nTry using less \
         reactions this time :checkered_flag:"
            .to_owned(),
    )
}

pub fn no_valid_reactions_message() -> MessageTemplate {
    text_message(
        "multireact.command.invalid.v1",
        "Oh no! You did not provide any valid reactions :open_mouth:\nMake sure you type the \
         reactions starting with `:`, or use the Emoji button (:slightly_smiling_face:) to add \
         one."
            .to_owned(),
    )
}

pub fn reactions_saved_message(slash_command: &str) -> MessageTemplate {
    text_message(
        "multireact.command.saved.v1",
        format!(
            "Great! Your new reactions are saved :sunglasses: Type `{slash_command}` to see them \
             at any time."
        ),
    )
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    BlocksBuilder::new()
        .section("multireact.error.summary.v1", format!(":warning: {summary}"))
        .context("multireact.error.context.v1", format!("Correlation ID: {correlation_id}"))
        .message(summary)
}

pub fn no_reactions_modal(slash_command: &str) -> View {
    View::Modal {
        title: TextObject::plain("Multi Reaction Add"),
        close: TextObject::plain("Close"),
        blocks: BlocksBuilder::new()
            .section(
                "multireact.shortcut.none.v1",
                format!(
                    "You do not have any reactions set :anguished:\nType `{slash_command} <list \
                     of emojis>` in the chat to set one."
                ),
            )
            .build(),
    }
}

pub fn home_tab_view(slash_command: &str, app_url: Option<&str>) -> View {
    let blocks = BlocksBuilder::new()
        .header("Setting emojis :floppy_disk:")
        .section(
            "multireact.home.set.v1",
            format!(
                "Type `{slash_command} <list of emojis>` in any chat to set a list of emojis for \
                 later usage."
            ),
        )
        .images(
            app_url,
            &[
                ("reaction-write-emojis.png", "write emojis"),
                ("reaction-save.png", "saved emojis"),
            ],
        )
        .section(
            "multireact.home.view.v1",
            format!(
                "You can view what you saved any moment by typing `{slash_command}` in any chat."
            ),
        )
        .images(
            app_url,
            &[("reaction-write-nothing.png", "view emojis"), ("reaction-view.png", "view emojis")],
        )
        .divider()
        .header("Adding Reactions :star-struck:")
        .section(
            "multireact.home.shortcut.v1",
            "Go to a message, click `More Actions`, then click on `Multireact` to react with the \
             saved emojis to the message.\n\nIf you can't see `Multireact`, click `More message \
             shortcuts...` to find it.",
        )
        .images(
            app_url,
            &[
                ("reaction-none.png", "message with no reactions"),
                ("reaction-menu.png", "message menu"),
                ("reaction-add.png", "message with reactions"),
            ],
        )
        .build();

    View::Home { blocks }
}
