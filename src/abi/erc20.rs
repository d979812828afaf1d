// src/abi/erc20.rs
//
// Minimal ERC-20 interface used by the token tools.

use lazy_static::lazy_static;

use crate::abi::{FunctionAbi, Param, ParamKind};

fn view_fn(name: &str, inputs: Vec<Param>, outputs: Vec<Param>) -> FunctionAbi {
    FunctionAbi { name: name.to_string(), inputs, outputs, state_mutability: "view".to_string() }
}

lazy_static! {
    pub static ref ERC20_NAME: FunctionAbi =
        view_fn("name", vec![], vec![Param::new("", ParamKind::String)]);
    pub static ref ERC20_SYMBOL: FunctionAbi =
        view_fn("symbol", vec![], vec![Param::new("", ParamKind::String)]);
    pub static ref ERC20_DECIMALS: FunctionAbi =
        view_fn("decimals", vec![], vec![Param::new("", ParamKind::Uint(8))]);
    pub static ref ERC20_TOTAL_SUPPLY: FunctionAbi =
        view_fn("totalSupply", vec![], vec![Param::new("", ParamKind::Uint(256))]);
    pub static ref ERC20_BALANCE_OF: FunctionAbi = view_fn(
        "balanceOf",
        vec![Param::new("owner", ParamKind::Address)],
        vec![Param::new("balance", ParamKind::Uint(256))],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_match_the_standard() {
        assert_eq!(hex::encode(ERC20_NAME.selector()), "06fdde03");
        assert_eq!(hex::encode(ERC20_SYMBOL.selector()), "95d89b41");
        assert_eq!(hex::encode(ERC20_DECIMALS.selector()), "313ce567");
        assert_eq!(hex::encode(ERC20_TOTAL_SUPPLY.selector()), "18160ddd");
        assert_eq!(hex::encode(ERC20_BALANCE_OF.selector()), "70a08231");
    }
}
