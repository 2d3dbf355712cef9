pub mod custom_codec;
pub mod field_parser;
pub mod message_factory;
pub mod stan_generator;
