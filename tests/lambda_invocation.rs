use std::error::Error;

mod common;

const SRC: &str = "func main
    f := -> x in x + 1
    ret f.(41)
end";

#[test]
fn compile_lambda_invocation() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;

    // the lambda is emitted under its synthetic name and called directly
    assert!(ir.contains("@\"lambda."));
    assert!(ir.contains("call i64 @\"lambda."));
    assert!(ir.contains("add i64 %x, 1"));
    Ok(())
}
