use std::error::Error;

mod common;

const SRC: &str = "func main
    y := 10
    f := -> x in x + y
    ret f.(1)
end";

#[test]
fn compile_lambda_with_captures() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;

    // the capture struct is allocated and populated at the lambda site,
    // and the captured field is passed before the explicit argument
    assert!(ir.contains("malloc { i64 }, i64 1"));
    assert!(ir.contains("%cap0.y"));
    Ok(())
}
