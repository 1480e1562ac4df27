//=============================================
// sciblock/modules/mod.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Native library handles
// Objective: Group the numeric, scientific and plotting modules that
//            blocks inject into snippet namespaces
//=============================================

pub mod numeric;
pub mod optimize;
pub mod plotting;
