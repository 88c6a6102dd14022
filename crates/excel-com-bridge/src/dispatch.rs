//! Late-bound IDispatch calls and VARIANT conversions.

#![cfg(windows)]

use std::mem::ManuallyDrop;
use std::ptr;

use windows::{
    core::{BSTR, GUID, HSTRING, PCWSTR},
    Win32::{
        Foundation::{DISP_E_EXCEPTION, VARIANT_BOOL},
        Globalization::GetSystemDefaultLCID,
        System::{
            Com::{
                CLSIDFromProgID, CoCreateInstance, IDispatch, CLSCTX_LOCAL_SERVER, DISPATCH_FLAGS,
                DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS, EXCEPINFO,
            },
            Ole::DISPID_PROPERTYPUT,
            Variant::{
                VARIANT, VARENUM, VT_BOOL, VT_BSTR, VT_DISPATCH, VT_EMPTY, VT_ERROR, VT_I2, VT_I4,
                VT_NULL, VT_R4, VT_R8,
            },
        },
    },
};

// VARIANT's inner unions are ManuallyDrop; fields are set with ptr::write.

fn variant_of(vt: VARENUM, fill: impl FnOnce(&mut VARIANT)) -> VARIANT {
    let mut v = VARIANT::default();
    unsafe {
        ptr::write(&mut (*v.Anonymous.Anonymous).vt, vt);
    }
    fill(&mut v);
    v
}

pub fn variant_bool(val: bool) -> VARIANT {
    variant_of(VT_BOOL, |v| unsafe {
        ptr::write(
            &mut (*v.Anonymous.Anonymous).Anonymous.boolVal,
            VARIANT_BOOL(if val { -1 } else { 0 }),
        );
    })
}

pub fn variant_i32(val: i32) -> VARIANT {
    variant_of(VT_I4, |v| unsafe {
        ptr::write(&mut (*v.Anonymous.Anonymous).Anonymous.lVal, val);
    })
}

pub fn variant_str(val: &str) -> VARIANT {
    variant_of(VT_BSTR, |v| unsafe {
        ptr::write(
            &mut (*v.Anonymous.Anonymous).Anonymous.bstrVal,
            ManuallyDrop::new(BSTR::from(val)),
        );
    })
}

/// Plain Rust view of the VARIANT kinds Excel hands back for cell values
pub enum Scalar {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
    Error(i32),
    Other(u16),
}

pub fn scalar(v: &VARIANT) -> Scalar {
    unsafe {
        let inner = &v.Anonymous.Anonymous;
        let data = &inner.Anonymous;
        match inner.vt {
            vt if vt == VT_EMPTY || vt == VT_NULL => Scalar::Empty,
            VT_BOOL => Scalar::Bool(data.boolVal.0 != 0),
            VT_R8 => Scalar::Number(data.dblVal),
            VT_R4 => Scalar::Number(data.fltVal as f64),
            VT_I4 => Scalar::Number(data.lVal as f64),
            VT_I2 => Scalar::Number(data.iVal as f64),
            VT_BSTR => Scalar::Text(data.bstrVal.to_string()),
            VT_ERROR => Scalar::Error(data.scode),
            other => Scalar::Other(other.0),
        }
    }
}

/// An IDispatch pointer with name-based member access
#[derive(Clone)]
pub struct DispatchObject {
    inner: IDispatch,
}

impl DispatchObject {
    /// Instantiate a local server by ProgID, e.g. `Excel.Application`
    pub fn create(progid: &str) -> Result<Self, String> {
        unsafe {
            let clsid = CLSIDFromProgID(&HSTRING::from(progid))
                .map_err(|e| format!("CLSIDFromProgID('{progid}') failed: {e}"))?;
            let inner: IDispatch = CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER)
                .map_err(|e| format!("CoCreateInstance('{progid}') failed: {e}"))?;
            Ok(Self { inner })
        }
    }

    fn dispid(&self, name: &str) -> Result<i32, String> {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let names = [PCWSTR(wide.as_ptr())];
        let mut dispid = 0i32;
        unsafe {
            self.inner
                .GetIDsOfNames(
                    &GUID::zeroed(),
                    names.as_ptr(),
                    1,
                    GetSystemDefaultLCID(),
                    &mut dispid,
                )
                .map_err(|e| format!("GetIDsOfNames('{name}') failed: {e}"))?;
        }
        Ok(dispid)
    }

    /// Call `name` with `args` in natural order
    fn invoke(&self, name: &str, flags: DISPATCH_FLAGS, args: &[VARIANT]) -> Result<VARIANT, String> {
        let dispid = self.dispid(name)?;
        // DISPPARAMS wants arguments last-to-first
        let mut reversed: Vec<VARIANT> = args.iter().rev().cloned().collect();
        let mut put_named = [DISPID_PROPERTYPUT];
        let is_put = flags == DISPATCH_PROPERTYPUT;
        let params = DISPPARAMS {
            rgvarg: if reversed.is_empty() {
                ptr::null_mut()
            } else {
                reversed.as_mut_ptr()
            },
            rgdispidNamedArgs: if is_put {
                put_named.as_mut_ptr()
            } else {
                ptr::null_mut()
            },
            cArgs: reversed.len() as u32,
            cNamedArgs: u32::from(is_put),
        };
        let mut result = VARIANT::default();
        let mut except = EXCEPINFO::default();
        unsafe {
            self.inner
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    flags,
                    &params,
                    if is_put { None } else { Some(&mut result) },
                    Some(&mut except),
                    None,
                )
                .map_err(|e| invoke_error(e, &except, name))?;
        }
        Ok(result)
    }

    pub fn get(&self, name: &str) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_PROPERTYGET, &[])
    }

    pub fn put(&self, name: &str, value: VARIANT) -> Result<(), String> {
        self.invoke(name, DISPATCH_PROPERTYPUT, &[value]).map(|_| ())
    }

    pub fn call(&self, name: &str, args: &[VARIANT]) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_METHOD, args)
    }

    /// Property returning an object, optionally indexed: `Worksheets("x")`,
    /// `Range("A1:A3")`, `Cells(r, c)`
    pub fn object(&self, name: &str, index: &[VARIANT]) -> Result<DispatchObject, String> {
        let v = self.invoke(name, DISPATCH_PROPERTYGET, index)?;
        as_object(&v, name)
    }

    /// Method returning an object, e.g. `Workbooks.Open(path)`
    pub fn call_object(&self, name: &str, args: &[VARIANT]) -> Result<DispatchObject, String> {
        let v = self.call(name, args)?;
        as_object(&v, name)
    }

    /// A numeric property such as `Count`
    pub fn get_i32(&self, name: &str) -> Result<i32, String> {
        match scalar(&self.get(name)?) {
            Scalar::Number(n) => Ok(n as i32),
            _ => Err(format!("'{name}' is not numeric")),
        }
    }
}

fn as_object(v: &VARIANT, name: &str) -> Result<DispatchObject, String> {
    unsafe {
        let inner = &v.Anonymous.Anonymous;
        if inner.vt == VT_DISPATCH {
            if let Some(disp) = inner.Anonymous.pdispVal.as_ref() {
                return Ok(DispatchObject {
                    inner: disp.clone(),
                });
            }
        }
        Err(format!("'{name}' did not return an object (VT={})", inner.vt.0))
    }
}

fn invoke_error(err: windows::core::Error, except: &EXCEPINFO, name: &str) -> String {
    if err.code() != DISP_E_EXCEPTION {
        return format!("Invoke('{name}') failed: {err}");
    }
    let desc = if except.bstrDescription.is_empty() {
        "(no description)".to_string()
    } else {
        except.bstrDescription.to_string()
    };
    format!("COM exception in '{name}': {desc}")
}
