//! Reply copy shown to chat users.

/// Greeting for `/start`.
pub const WELCOME: &str = "Welcome! | Bine ai venit! | ¡Bienvenidos! | Добро пожаловать!\n\n\
- Ask me a question!\n\
- Întreabă-mă ceva!\n\
- Hazme una pregunta!\n\
- Задайте мне вопрос!\n";

/// Description for `/help`.
pub const HELP: &str = r#####"This bot relays your messages to an artificial intelligence (OpenAI).

How does it work?
Send a message in this chat. It is forwarded to the AI, and the answer comes back as a reply.
You can ask it questions, or ask it to help you with something.

What languages does the AI understand?
English works best, but the AI understands many other languages too. Give it a try.

How can I contact you?
Type the command /feedback followed by your message, and the bot will forward it to the owner of this bot.

Do you collect the messages?
No. The bot only forwards your message to the AI.
The bot keeps usage counters (number of messages, errors, and so on), but the messages themselves are not stored."#####;

pub const FEEDBACK_UNAVAILABLE: &str = "This feature is currently unavailable.";
pub const FEEDBACK_TOO_SHORT: &str = "Your message is too short. Write minimum 16 characters.";
pub const FEEDBACK_DELIVERED: &str = "Your message has been delivered.\nThank you for using our service.";

pub const COMMAND_NOT_FOUND: &str = "Command not found.";
pub const STATS_FAILED: &str = "Something went wrong. Can not generate the stats.";

pub const TEXT_TOO_SHORT: &str = "The message is too short.";
pub const TEXT_TOO_LONG: &str = "The message is too long (max: 1024 characters).";

pub const AI_TIMEOUT: &str = "Error: AI request timeout occurred...\nPlease, try again.";
pub const AI_UNAVAILABLE: &str = "Error: The AI is unavailable or has no response...\nPlease, try again.";

/// Reply for `/who`.
pub fn worker_identity(worker_id: usize) -> String {
    format!("I am worker #{worker_id}")
}

/// Reply for `/me`.
pub fn user_identity(username: Option<&str>, user_id: i64) -> String {
    format!("Username: {}\nUser ID: {user_id}", username.unwrap_or_default())
}
