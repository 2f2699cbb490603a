#![allow(dead_code)]

#[macro_export]
macro_rules! assert_ok {
    ($e:expr $(,)?) => {
        match $e {
            ::std::result::Result::Ok(v) => v,
            ::std::result::Result::Err(e) => panic!("expected Ok, got Err({:?})", e),
        }
    };
    ($e:expr, $($arg:tt)+) => {
        match $e {
            ::std::result::Result::Ok(v) => v,
            ::std::result::Result::Err(e) => {
                panic!("expected Ok, got Err({:?}): {}", e, format_args!($($arg)+))
            }
        }
    };
}

#[macro_export]
macro_rules! assert_err {
    ($e:expr $(,)?) => {
        match $e {
            ::std::result::Result::Ok(v) => panic!("expected Err, got Ok({:?})", v),
            ::std::result::Result::Err(e) => e,
        }
    };
    ($e:expr, $($arg:tt)+) => {
        match $e {
            ::std::result::Result::Ok(v) => {
                panic!("expected Err, got Ok({:?}): {}", v, format_args!($($arg)+))
            }
            ::std::result::Result::Err(e) => e,
        }
    };
}

#[macro_export]
macro_rules! assert_some {
    ($e:expr $(,)?) => {
        match $e {
            ::std::option::Option::Some(v) => v,
            ::std::option::Option::None => panic!("expected Some, got None"),
        }
    };
    ($e:expr, $($arg:tt)+) => {
        match $e {
            ::std::option::Option::Some(v) => v,
            ::std::option::Option::None => {
                panic!("expected Some, got None: {}", format_args!($($arg)+))
            }
        }
    };
}

#[macro_export]
macro_rules! assert_none {
    ($e:expr $(,)?) => {
        if let ::std::option::Option::Some(v) = $e {
            panic!("expected None, got Some({:?})", v);
        }
    };
    ($e:expr, $($arg:tt)+) => {
        if let ::std::option::Option::Some(v) = $e {
            panic!("expected None, got Some({:?}): {}", v, format_args!($($arg)+));
        }
    };
}
