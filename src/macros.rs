/// Macro to create the consts of the supported watch codenames.
macro_rules! watches {
    (
        $(
            $(#[$docs:meta])*
            ($upcase:ident, $codename:literal)$(,)*
        )+
    ) => {
        $(
            $(#[$docs])*
            #[doc = concat!("The `", $codename, "` watch.")]
            pub const $upcase: Codename = Codename($codename);
        )+

        /// Every supported codename, in alphabetical order.
        pub const ALL: &[Codename] = &[$($upcase),+];

        impl FromStr for Codename {
            type Err = WatchError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(
                        $codename => Ok($upcase),
                    )+
                    _ => Err(WatchError::UnknownCodename(s.to_string())),
                }
            }
        }
    }
}
