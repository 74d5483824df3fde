use std::error::Error;

mod common;

const SRC: &str = "class point
    x : int

    copy
        ret new point
    end
end

func main
    var p := new point
    q := new point
    p = q
    ret 0
end";

#[test]
fn compile_copier_runs_on_assignment() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;
    assert!(ir.contains("call %class.point* @\"dachs.copy."));
    Ok(())
}
