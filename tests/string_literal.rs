use std::error::Error;

mod common;

const SRC: &str = "func main
    s := \"hi\"
    ret 0
end";

#[test]
fn compile_string_literal_becomes_byte_global() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;
    assert!(ir.contains("@str.0 = private constant [3 x i8] c\"hi\\00\""));
    Ok(())
}
