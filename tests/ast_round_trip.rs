use std::error::Error;

const SRC: &str = "func add(a, b)
    ret a + b
end

func main
    for i in 0..3
        p(i)
    end
    ret add(1, 2)
end";

#[test]
fn ast_survives_serialization_round_trip() -> Result<(), Box<dyn Error>> {
    let unit = dachs::parser::parse(SRC, Some("test.dcs"))?;
    let json = serde_json::to_string(&unit)?;
    let back: dachs::parser::ast::CompilationUnit = serde_json::from_str(&json)?;
    assert_eq!(unit, back);
    Ok(())
}
