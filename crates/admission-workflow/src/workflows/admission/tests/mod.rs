mod common;
mod hold;
mod validator;
