use std::error::Error;

mod common;

const SRC: &str = "func twice(x: int, f)
    ret f.(f.(x))
end

func main
    ret twice(10) { |v| v + 1 }
end";

#[test]
fn compile_trailing_block_argument() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;

    assert!(ir.contains("call i64 @\"twice."));
    assert!(ir.contains("@\"lambda."));
    Ok(())
}
