pub mod samad_data_types;

use teloxide::{dispatching::dialogue::InMemStorage, prelude::Dialogue, utils::command::BotCommands};

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "meals of this and next week")]
    Menu,
    #[command(description = "remaining credit")]
    Credit,
    #[command(description = "save student id and password")]
    Register,
    #[command(description = "delete saved credentials")]
    Forget,
    #[command(hide)]
    Start,
}

#[derive(Clone, Default)]
pub enum DialogueState {
    #[default]
    Default,
    AwaitStudentId,
    AwaitPassword {
        student_id: String,
    },
}

pub type DialogueType = Dialogue<DialogueState, InMemStorage<DialogueState>>;
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
