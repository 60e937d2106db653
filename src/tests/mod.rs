mod support;

mod parser_test;
mod server_test;
