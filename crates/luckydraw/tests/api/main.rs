mod draw;
mod helpers;
mod messages;
